//! Environment handed to every spawned process.
//!
//! Envfile assignments are applied once, before anything is spawned, into an
//! explicit overlay that each child receives on top of the inherited
//! environment.

use std::collections::BTreeMap;

use crate::config::EnvEntry;

/// Variables exported to children, in addition to the inherited environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Applies validated envfile entries. Later entries override earlier ones.
    pub fn load(entries: &[EnvEntry]) -> Self {
        let mut env = Self::default();
        for entry in entries {
            env.set(&entry.name, &entry.value);
        }
        tracing::debug!(count = env.vars.len(), "loaded envfile");
        env
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: &str) -> EnvEntry {
        EnvEntry {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn later_assignment_wins() {
        let env = Environment::load(&[entry("A", "1"), entry("B", "2"), entry("A", "3")]);
        assert_eq!(env.get("A"), Some("3"));
        assert_eq!(env.get("B"), Some("2"));
        assert_eq!(env.iter().count(), 2);
    }

    #[test]
    fn unknown_name_is_absent() {
        let env = Environment::load(&[]);
        assert_eq!(env.get("MISSING"), None);
    }
}

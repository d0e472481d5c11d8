//! Sequential port allocation.

use anyhow::{bail, Context, Result};

use crate::env::Environment;
use crate::template;

/// Name of the port placeholder variable.
pub const PORT_VAR: &str = "PORT";
/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Port handed to the next spawned process.
///
/// Seeded from `PORT` and advanced once for every procfile entry whose raw
/// command references the placeholder, so ports follow file order. Once
/// `u16::MAX` has been handed out the counter is exhausted and further claims
/// fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCounter {
    current: u16,
    exhausted: bool,
}

impl PortCounter {
    pub fn new(start: u16) -> Self {
        Self {
            current: start,
            exhausted: false,
        }
    }

    /// Seeds from `PORT` in the envfile overlay, then the inherited
    /// environment, then the default.
    pub fn seeded(env: &Environment) -> Result<Self> {
        match env.get(PORT_VAR) {
            Some(value) => Self::from_value(Some(value)),
            None => Self::from_value(std::env::var(PORT_VAR).ok().as_deref()),
        }
    }

    pub fn from_value(value: Option<&str>) -> Result<Self> {
        let start = match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid {} value {:?}", PORT_VAR, raw))?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(start))
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    /// Hands out the current port and moves to the next one.
    pub fn claim(&mut self) -> Result<u16> {
        if self.exhausted {
            bail!("ran out of ports after {}", self.current);
        }
        let port = self.current;
        match self.current.checked_add(1) {
            Some(next) => self.current = next,
            None => self.exhausted = true,
        }
        Ok(port)
    }
}

/// Whether the unexpanded command references the port placeholder.
pub fn references_port(raw_command: &str) -> bool {
    template::references(raw_command).contains(&PORT_VAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_8080() {
        assert_eq!(PortCounter::from_value(None).unwrap().current(), 8080);
        assert_eq!(PortCounter::from_value(Some("")).unwrap().current(), 8080);
    }

    #[test]
    fn inherits_explicit_value() {
        assert_eq!(PortCounter::from_value(Some("5000")).unwrap().current(), 5000);
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(PortCounter::from_value(Some("http")).is_err());
    }

    #[test]
    fn claim_hands_out_then_increments() {
        let mut ports = PortCounter::new(8080);
        assert_eq!(ports.claim().unwrap(), 8080);
        assert_eq!(ports.claim().unwrap(), 8081);
        assert_eq!(ports.current(), 8082);
    }

    #[test]
    fn last_port_is_usable_once() {
        let mut ports = PortCounter::new(u16::MAX);
        assert_eq!(ports.claim().unwrap(), u16::MAX);
        assert_eq!(ports.current(), u16::MAX);
        let err = ports.claim().unwrap_err();
        assert_eq!(err.to_string(), "ran out of ports after 65535");
    }

    #[test]
    fn envfile_port_takes_precedence() {
        let mut env = Environment::default();
        env.set(PORT_VAR, "5000");
        assert_eq!(PortCounter::seeded(&env).unwrap().current(), 5000);
        env.set(PORT_VAR, "web");
        assert!(PortCounter::seeded(&env).is_err());
    }

    #[test]
    fn detects_placeholder_in_raw_command() {
        assert!(references_port("serve -p $PORT"));
        assert!(references_port("serve -p ${PORT}"));
        assert!(!references_port("serve -p 8080"));
        assert!(!references_port("echo $PORTS"));
        assert!(!references_port("echo \\$PORT"));
    }
}

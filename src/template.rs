//! Variable substitution for procfile commands.
//!
//! Only `$NAME` and `${NAME}` references to variables the caller recognizes
//! are replaced. Everything else, including `\$` escapes and references to
//! unknown names, is left in place for the shell that runs the command.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("variable reference pattern is valid")
    })
}

/// Expands recognized variable references in `command`.
///
/// `lookup` returns the value for a recognized name, or `None` to leave the
/// reference untouched.
pub fn expand<'a, F>(command: &'a str, lookup: F) -> Cow<'a, str>
where
    F: Fn(&str) -> Option<String>,
{
    reference_regex().replace_all(command, |caps: &Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2));
        match name.and_then(|name| lookup(name.as_str())) {
            Some(value) => value,
            None => caps[0].to_string(),
        }
    })
}

/// Returns every variable name referenced by `command`, in order.
pub fn references(command: &str) -> Vec<&str> {
    reference_regex()
        .captures_iter(command)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "PORT" => Some("8080".into()),
            "HOST" => Some("localhost".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_both_reference_forms() {
        assert_eq!(
            expand("serve --bind $HOST:${PORT}", lookup),
            "serve --bind localhost:8080"
        );
    }

    #[test]
    fn leaves_unknown_and_escaped_references() {
        assert_eq!(expand("echo $HOME \\$PORT", lookup), "echo $HOME \\$PORT");
    }

    #[test]
    fn name_boundary_is_respected() {
        assert_eq!(expand("echo $PORTS", lookup), "echo $PORTS");
        assert_eq!(expand("echo ${PORT}S", lookup), "echo 8080S");
    }

    #[test]
    fn references_lists_names() {
        assert_eq!(references("a $X ${Y} \\$Z"), vec!["X", "Y"]);
    }
}

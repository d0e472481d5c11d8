//! Procfile and envfile loading.
//!
//! Both files are flat and line oriented. This module reads them from disk and
//! applies the shared line filter (blank lines, `#` and `$` lines, trailing
//! comments) that every later parsing step relies on.

use std::path::Path;

use anyhow::{Context, Result};

/// Default location of the procfile.
pub const DEFAULT_PROCFILE: &str = "Procfile";
/// Default location of the envfile.
pub const DEFAULT_ENVFILE: &str = ".env";

/// A single `name:command` line of the procfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    /// Identifier shown in the log stream.
    pub name: String,
    /// Raw shell text, before variable expansion.
    pub command: String,
}

/// A single `NAME=value` line of the envfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

/// Returns the line unchanged unless it is blank or starts with `#` or `$`.
pub fn filter_line(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('$') {
        None
    } else {
        Some(line)
    }
}

/// Cuts a trailing comment at the first unescaped `#`.
///
/// `\#` is kept as a literal `#`. Trailing whitespace left in front of the
/// comment is trimmed, so `a:b # c` and `a:b` compare equal.
pub fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'#') => {
                chars.next();
                out.push('#');
            }
            '#' => break,
            _ => out.push(ch),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Yields `(line_number, content)` for every line that survives the filter.
///
/// Line numbers are 1-based and refer to the original file. A line that is
/// nothing but a comment after stripping is dropped as well.
pub fn retained_lines(text: &str) -> impl Iterator<Item = (usize, String)> + '_ {
    text.lines().enumerate().filter_map(|(idx, line)| {
        let line = filter_line(line)?;
        let stripped = strip_comment(line);
        if stripped.trim().is_empty() {
            None
        } else {
            Some((idx + 1, stripped))
        }
    })
}

/// Reads the procfile. A missing procfile is an error.
pub fn read_procfile(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read procfile {}", path.display()))
}

/// Reads the envfile. A missing envfile reads as empty.
pub fn read_envfile(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "envfile not found, using empty environment");
            Ok(String::new())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read envfile {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_skips_blank_comment_and_dollar_lines() {
        assert_eq!(filter_line(""), None);
        assert_eq!(filter_line("   "), None);
        assert_eq!(filter_line("# web: nope"), None);
        assert_eq!(filter_line("  # indented"), None);
        assert_eq!(filter_line("$ web: nope"), None);
        assert_eq!(filter_line("web: ok"), Some("web: ok"));
    }

    #[test]
    fn strip_comment_is_idempotent() {
        assert_eq!(strip_comment("web:echo hi # trailing"), "web:echo hi");
        assert_eq!(strip_comment("web:echo hi"), "web:echo hi");
        assert_eq!(
            strip_comment(&strip_comment("web:echo hi # trailing")),
            "web:echo hi"
        );
    }

    #[test]
    fn strip_comment_keeps_escaped_hash() {
        assert_eq!(strip_comment(r"web:echo \#1 # two"), "web:echo #1");
    }

    #[test]
    fn retained_lines_keeps_original_line_numbers() {
        let text = "# header\n\nweb:echo a\n$ skipped\nworker:echo b # note\n";
        let lines = retained_lines(text).collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                (3, "web:echo a".to_string()),
                (5, "worker:echo b".to_string()),
            ]
        );
    }

    #[test]
    fn missing_envfile_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let raw = read_envfile(&dir.path().join(".env")).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn missing_procfile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_procfile(&dir.path().join("Procfile")).unwrap_err();
        assert!(err.to_string().contains("failed to read procfile"));
    }
}

//! Syntax checks for procfile and envfile entries.
//!
//! Validation never stops at the first problem: every retained line is
//! checked and every violation is collected, so a user fixing a file sees the
//! complete list at once. Any violation fails the whole file.

use std::fmt;

use thiserror::Error;

use crate::config::{retained_lines, EnvEntry, ProcEntry};

/// Exit code used when the envfile fails validation.
pub const ENVFILE_EXIT_CODE: i32 = 3;
/// Exit code used when the procfile fails validation.
pub const PROCFILE_EXIT_CODE: i32 = 4;

/// The rule a line broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Procfile line is not `<name>:<command>`.
    NoColonCommand,
    /// Name contains a character outside `[A-Za-z0-9_]`.
    InvalidChar,
    /// Envfile line is not `<NAME>=<value>`.
    NoEqualMark,
    /// Envfile line contains whitespace.
    ValueHaveSpace,
}

impl ViolationKind {
    pub fn tag(self) -> &'static str {
        match self {
            ViolationKind::NoColonCommand => "no_colon_command",
            ViolationKind::InvalidChar => "invalid_char",
            ViolationKind::NoEqualMark => "no_equal_mark",
            ViolationKind::ValueHaveSpace => "value_have_space",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One broken rule on one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// 1-based line number in the source file.
    pub line: usize,
    pub kind: ViolationKind,
    /// The line after comment stripping.
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.line, self.kind, self.text)
    }
}

/// Aggregated validation failure for one file.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid envfile ({} violations)", .0.len())]
    Envfile(Vec<Violation>),
    #[error("invalid procfile ({} violations)", .0.len())]
    Procfile(Vec<Violation>),
}

impl ValidationError {
    /// Process exit code for this failure; distinct per file kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidationError::Envfile(_) => ENVFILE_EXIT_CODE,
            ValidationError::Procfile(_) => PROCFILE_EXIT_CODE,
        }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationError::Envfile(v) | ValidationError::Procfile(v) => v,
        }
    }
}

/// Entries of both files once they passed validation.
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub env: Vec<EnvEntry>,
    pub procs: Vec<ProcEntry>,
}

/// Validates the envfile first and the procfile only if the envfile passed.
pub fn verify(envfile: &str, procfile: &str) -> Result<Validated, ValidationError> {
    let env = verify_envfile(envfile)?;
    let procs = verify_procfile(procfile)?;
    Ok(Validated { env, procs })
}

/// Checks every `name:command` line, splitting at the first colon.
pub fn verify_procfile(text: &str) -> Result<Vec<ProcEntry>, ValidationError> {
    let mut entries = Vec::new();
    let mut violations = Vec::new();
    for (line, content) in retained_lines(text) {
        let mut report = |kind| {
            violations.push(Violation {
                line,
                kind,
                text: content.clone(),
            })
        };
        let Some((name, command)) = split_pair(&content, ':') else {
            report(ViolationKind::NoColonCommand);
            continue;
        };
        if !is_identifier(name) {
            report(ViolationKind::InvalidChar);
            continue;
        }
        entries.push(ProcEntry {
            name: name.to_string(),
            command: command.trim().to_string(),
        });
    }
    if violations.is_empty() {
        Ok(entries)
    } else {
        Err(ValidationError::Procfile(violations))
    }
}

/// Checks every `NAME=value` line, splitting at the first equals sign.
pub fn verify_envfile(text: &str) -> Result<Vec<EnvEntry>, ValidationError> {
    let mut entries = Vec::new();
    let mut violations = Vec::new();
    for (line, content) in retained_lines(text) {
        let before = violations.len();
        let pair = split_pair(&content, '=');
        match pair {
            None => violations.push(Violation {
                line,
                kind: ViolationKind::NoEqualMark,
                text: content.clone(),
            }),
            Some((name, _)) if !is_identifier(name) => violations.push(Violation {
                line,
                kind: ViolationKind::InvalidChar,
                text: content.clone(),
            }),
            Some(_) => {}
        }
        if content.chars().any(char::is_whitespace) {
            violations.push(Violation {
                line,
                kind: ViolationKind::ValueHaveSpace,
                text: content.clone(),
            });
        }
        if violations.len() == before {
            if let Some((name, value)) = pair {
                entries.push(EnvEntry {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
    if violations.is_empty() {
        Ok(entries)
    } else {
        Err(ValidationError::Envfile(violations))
    }
}

// Both sides must be non-empty; the remainder keeps any further delimiters.
fn split_pair(line: &str, delimiter: char) -> Option<(&str, &str)> {
    let (left, right) = line.split_once(delimiter)?;
    if left.is_empty() || right.trim().is_empty() {
        return None;
    }
    Some((left, right))
}

/// `[A-Za-z0-9_]+`, not starting with a digit, as for shell variable names.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

//! Data structures for tracking spawned processes.
//!
//! A `RunningProcess` is created by the spawner the moment a procfile entry
//! has been launched and travels with the first event of that process so the
//! log printer can render its banner and color every following line.

/// First SGR foreground code of the palette (bright black).
pub const COLOR_BASE: u8 = 90;
/// Number of colors in the palette.
pub const COLOR_COUNT: u32 = 8;

/// A procfile entry that has been launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    /// Process id of the group leader.
    pub pid: u32,
    /// Procfile name of the entry.
    pub name: String,
    /// Command as handed to the shell, after variable expansion.
    pub command: String,
    /// ANSI SGR foreground code used for every line of this process.
    pub color: u8,
}

impl RunningProcess {
    /// Creates the record and derives its color from the pid and run seed.
    pub fn new(pid: u32, name: impl Into<String>, command: impl Into<String>, seed: u32) -> Self {
        Self {
            pid,
            name: name.into(),
            command: command.into(),
            color: color_for(pid, seed),
        }
    }
}

/// Picks one of eight foreground colors: `(pid + seed) mod 8 + base`.
pub fn color_for(pid: u32, seed: u32) -> u8 {
    let offset = (u64::from(pid) + u64::from(seed)) % u64::from(COLOR_COUNT);
    COLOR_BASE + offset as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_stays_in_palette() {
        for pid in 0..64 {
            let color = color_for(pid, u32::MAX);
            assert!((COLOR_BASE..COLOR_BASE + 8).contains(&color));
        }
    }

    #[test]
    fn color_is_deterministic_per_seed() {
        assert_eq!(color_for(100, 3), color_for(100, 3));
        assert_eq!(color_for(100, 0), COLOR_BASE + 4);
        assert_eq!(color_for(101, 0), COLOR_BASE + 5);
        assert_eq!(RunningProcess::new(8, "web", "true", 0).color, COLOR_BASE);
    }
}

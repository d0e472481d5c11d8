//! Log multiplexing for process output.
//!
//! Every reader task sends its lines over one channel to a single
//! `LogPrinter`, which owns the output writer. Lines of one process keep their
//! order; lines of different processes interleave as they arrive. Each line is
//! prefixed with a timestamp and the process name and wrapped in the color of
//! its process.

use std::collections::HashMap;
use std::io::Write;

use tokio::sync::mpsc;

use crate::events::Event;
use crate::process::RunningProcess;

const RESET: &str = "\u{1b}[0m";
const FAILURE_COLOR: u8 = 31;

/// Consumes process events and writes the combined, colored log stream.
pub struct LogPrinter<W> {
    writer: W,
    name_width: usize,
    processes: HashMap<usize, RunningProcess>,
}

impl<W: Write> LogPrinter<W> {
    /// `name_width` pads names so the `|` separators line up.
    pub fn new(writer: W, name_width: usize) -> Self {
        Self {
            writer,
            name_width,
            processes: HashMap::new(),
        }
    }

    /// Prints events until every sender is gone, then hands the writer back.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>) -> W {
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        let _ = self.writer.flush();
        self.writer
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::ProcessStarted { id, process } => {
                let text = format!("start: {} (pid {})", process.command, process.pid);
                self.emit(&process.name, &text, process.color);
                self.processes.insert(id, process);
            }
            Event::ProcessOutput { id, line } => {
                let Some(process) = self.processes.get(&id) else {
                    tracing::debug!(id, "output from unknown process");
                    return;
                };
                let (name, color) = (process.name.clone(), process.color);
                self.emit(&name, &line, color);
            }
            Event::ProcessFailed { id, name, error } => {
                tracing::debug!(id, %name, "reporting launch failure");
                let text = format!("failed to start: {}", error);
                self.emit(&name, &text, FAILURE_COLOR);
            }
        }
    }

    fn emit(&mut self, name: &str, text: &str, color: u8) {
        let line = format_line(&timestamp(), name, self.name_width, text, color);
        let _ = writeln!(self.writer, "{}", line);
        let _ = self.writer.flush();
    }
}

/// Renders one colored log line; the reset code closes it.
pub fn format_line(timestamp: &str, name: &str, width: usize, text: &str, color: u8) -> String {
    format!(
        "\u{1b}[{}m{} {:<width$} | {}{}",
        color,
        timestamp,
        name,
        text,
        RESET,
        width = width
    )
}

/// Width needed to align every name in `names`.
pub fn name_width<'a>(names: impl IntoIterator<Item = &'a str>) -> usize {
    names.into_iter().map(|name| name.chars().count()).max().unwrap_or(0)
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

//! Process execution and supervision.
//!
//! This module contains the `ProcessManager`, which launches every procfile
//! entry as its own process group, hands each merged output stream to a reader
//! task, waits for all of them, and performs the kill sweep when a termination
//! signal arrives.

use std::io::Write;
use std::process::Stdio;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::ProcEntry;
use crate::env::Environment;
use crate::events::Event;
use crate::port::{self, PortCounter, PORT_VAR};
use crate::process::RunningProcess;
use crate::registry::PidRegistry;
use crate::template;

/// Lifecycle of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Nothing running: before the first spawn or after every process exited.
    Idle,
    /// Processes were spawned and are being waited on.
    Running,
    /// A termination signal arrived; the kill sweep is in progress.
    Terminating,
}

/// Exit information collected by [`ProcessManager::wait_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    pub pid: u32,
    /// `None` when the process was killed by a signal or was already gone.
    pub code: Option<i32>,
}

/// Spawns procfile entries and supervises the resulting processes.
pub struct ProcessManager {
    env: Environment,
    ports: PortCounter,
    registry: PidRegistry,
    event_tx: mpsc::Sender<Event>,
    color_seed: u32,
    processes: Vec<ManagedProcess>,
    state: SupervisorState,
}

struct ManagedProcess {
    pid: u32,
    name: String,
    child: Option<Child>,
}

impl ProcessManager {
    pub fn new(
        env: Environment,
        ports: PortCounter,
        registry: PidRegistry,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            env,
            ports,
            registry,
            event_tx,
            color_seed: rand::random(),
            processes: Vec::new(),
            state: SupervisorState::Idle,
        }
    }

    /// Fixes the color seed instead of drawing a random one.
    #[cfg(test)]
    pub fn with_color_seed(mut self, seed: u32) -> Self {
        self.color_seed = seed;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn registry(&self) -> &PidRegistry {
        &self.registry
    }

    /// Port the next port-referencing entry will receive.
    pub fn next_port(&self) -> u16 {
        self.ports.current()
    }

    /// Launches every entry in file order without waiting for any of them.
    pub async fn spawn_all(&mut self, entries: &[ProcEntry]) -> Result<()> {
        self.state = SupervisorState::Running;
        for (id, entry) in entries.iter().enumerate() {
            self.spawn(id, entry).await?;
        }
        Ok(())
    }

    /// Launches one entry as a new process group leader.
    ///
    /// The leader pid is registered as soon as the launch returns, before any
    /// output is read. A launch failure is reported on the log stream and
    /// returns `Ok(None)` so siblings still start. A port is claimed before the
    /// launch whenever the raw command references the placeholder, so the
    /// counter advances whether or not the launch succeeds. Running out of
    /// ports fails before anything is launched for this entry.
    pub async fn spawn(&mut self, id: usize, entry: &ProcEntry) -> Result<Option<u32>> {
        let port = if port::references_port(&entry.command) {
            self.ports.claim()?
        } else {
            self.ports.current()
        };
        let port_value = port.to_string();
        let expanded = template::expand(&entry.command, |name| {
            if name == PORT_VAR {
                Some(port_value.clone())
            } else {
                self.env.get(name).map(str::to_string)
            }
        })
        .into_owned();

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&expanded)
            .envs(self.env.iter())
            .env(PORT_VAR, &port_value)
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                if libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        #[cfg(not(unix))]
        {
            command.stderr(Stdio::piped());
        }

        let spawned = command.spawn().and_then(|child| match child.id() {
            Some(pid) => Ok((child, pid)),
            None => Err(std::io::Error::other("process exited before its pid was read")),
        });
        let result = match spawned {
            Ok((mut child, pid)) => {
                self.registry.register(pid);
                tracing::debug!(
                    name = %entry.name,
                    pid,
                    port = %port_value,
                    command = %expanded,
                    "spawned"
                );
                let process = RunningProcess::new(pid, &entry.name, &expanded, self.color_seed);
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(read_stream(id, process, stdout, self.event_tx.clone()));
                }
                #[cfg(not(unix))]
                {
                    if let Some(stderr) = child.stderr.take() {
                        tokio::spawn(read_lines(id, stderr, self.event_tx.clone()));
                    }
                }
                self.processes.push(ManagedProcess {
                    pid,
                    name: entry.name.clone(),
                    child: Some(child),
                });
                Some(pid)
            }
            Err(err) => {
                tracing::warn!(name = %entry.name, %err, "failed to spawn");
                let _ = self
                    .event_tx
                    .send(Event::ProcessFailed {
                        id,
                        name: entry.name.clone(),
                        error: err.to_string(),
                    })
                    .await;
                None
            }
        };

        Ok(result)
    }

    /// Waits on every registered pid, one after another, in registry order.
    ///
    /// A pid that is already gone counts as finished. Safe to cancel and call
    /// again: children that were not reaped yet are waited on next time.
    pub async fn wait_all(&mut self) -> Vec<ExitRecord> {
        let mut exits = Vec::new();
        let mut index = 0;
        while let Some(pid) = self.registry.get(index) {
            index += 1;
            let Some(process) = self.processes.iter_mut().find(|p| p.pid == pid) else {
                continue;
            };
            let Some(child) = process.child.as_mut() else {
                continue;
            };
            let code = match child.wait().await {
                Ok(status) => {
                    tracing::debug!(name = %process.name, pid, ?status, "process exited");
                    status.code()
                }
                Err(err) => {
                    tracing::debug!(name = %process.name, pid, %err, "process already gone");
                    None
                }
            };
            process.child = None;
            exits.push(ExitRecord { pid, code });
        }
        if self.state == SupervisorState::Running {
            self.state = SupervisorState::Idle;
        }
        exits
    }

    /// Switches to `Terminating` and kills every registered process.
    ///
    /// Writes one `killing pid N` line per attempt to `out` and returns the
    /// number of attempts.
    pub fn terminate<W: Write>(&mut self, out: &mut W) -> usize {
        self.state = SupervisorState::Terminating;
        kill_sweep(&self.registry, out)
    }
}

/// Sends `SIGKILL` to every registered pid and its process group, in order.
///
/// Failures, such as a process that already exited, are ignored and the
/// sweep always visits every pid.
pub fn kill_sweep<W: Write>(registry: &PidRegistry, out: &mut W) -> usize {
    let mut attempts = 0;
    for pid in registry.snapshot() {
        let _ = writeln!(out, "killing pid {}", pid);
        force_kill(pid);
        attempts += 1;
    }
    let _ = out.flush();
    attempts
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if pid <= 0 {
        return;
    }
    unsafe {
        let _ = libc::kill(-pid, libc::SIGKILL);
        let _ = libc::kill(pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn force_kill(pid: u32) {
    // Children are owned by the manager; without unix signals there is no way
    // to reach an arbitrary pid here.
    tracing::warn!(pid, "forced kill is only supported on unix");
}

// Emits the banner, then every line until the stream closes.
async fn read_stream<R>(id: usize, process: RunningProcess, reader: R, tx: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin,
{
    let _ = tx.send(Event::ProcessStarted { id, process }).await;
    read_lines(id, reader, tx).await;
}

async fn read_lines<R>(id: usize, reader: R, tx: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(Event::ProcessOutput { id, line }).await.is_err() {
                    break;
                }
            }
        }
    }
}

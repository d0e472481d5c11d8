//! Procrack: runs every entry of a Procfile side by side.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, validates the procfile and envfile, starts every process, and
//! supervises them until they all exit or a termination signal arrives.

mod config;
mod env;
mod events;
mod output;
mod port;
mod process;
mod registry;
mod runner;
mod template;
mod validate;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::env::Environment;
use crate::events::ProcessSignal;
use crate::output::LogPrinter;
use crate::port::PortCounter;
use crate::registry::{PidRegistry, RECORD_FILE};
use crate::runner::ProcessManager;
use crate::validate::{ValidationError, Validated};

/// How long the printer may keep draining output after supervision ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "procrack",
    version,
    about = "Run every process of a Procfile with one combined log",
    styles = help_styles()
)]
struct Cli {
    /// Path to the procfile.
    #[arg(short = 'f', value_name = "PATH", default_value = config::DEFAULT_PROCFILE)]
    procfile: PathBuf,
    /// Path to the envfile.
    #[arg(short = 'e', value_name = "PATH", default_value = config::DEFAULT_ENVFILE)]
    envfile: PathBuf,
    /// Validate both files and exit without starting anything.
    #[arg(short = 'c')]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("procrack: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let procfile = config::read_procfile(&cli.procfile)?;
    let envfile = config::read_envfile(&cli.envfile)?;

    let validated = match validate::verify(&envfile, &procfile) {
        Ok(validated) => validated,
        Err(err) => {
            report_violations(&err, &cli, &mut std::io::stdout());
            return Ok(exit_code(err.exit_code()));
        }
    };
    if cli.check {
        println!(
            "{} and {} are valid",
            cli.procfile.display(),
            cli.envfile.display()
        );
        return Ok(ExitCode::SUCCESS);
    }

    supervise(validated).await?;
    Ok(ExitCode::SUCCESS)
}

/// Starts every process and blocks until they exit or a signal arrives.
async fn supervise(validated: Validated) -> Result<()> {
    let env = Environment::load(&validated.env);
    let ports = PortCounter::seeded(&env)?;
    let registry = PidRegistry::with_record(Path::new(RECORD_FILE))?;
    let mut signals = SignalListener::install()?;

    let (event_tx, event_rx) = mpsc::channel(256);
    let width = output::name_width(validated.procs.iter().map(|p| p.name.as_str()));
    let printer = tokio::spawn(LogPrinter::new(std::io::stdout(), width).run(event_rx));

    let mut manager = ProcessManager::new(env, ports, registry, event_tx);
    if let Err(err) = manager.spawn_all(&validated.procs).await {
        manager.terminate(&mut std::io::stdout());
        manager.wait_all().await;
        return Err(err);
    }
    if manager.registry().is_empty() {
        tracing::warn!("no process was started");
    }
    tracing::debug!(
        spawned = manager.registry().len(),
        next_port = manager.next_port(),
        state = ?manager.state(),
        "supervising"
    );

    let received = tokio::select! {
        exits = manager.wait_all() => {
            for exit in &exits {
                tracing::debug!(pid = exit.pid, code = ?exit.code, "reaped");
            }
            None
        }
        signal = signals.recv() => Some(signal),
    };

    if let Some(signal) = received {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "received {}, killing all processes", signal.label());
        manager.terminate(&mut stdout);
        manager.wait_all().await;
    }

    drop(manager);
    if tokio::time::timeout(DRAIN_TIMEOUT, printer).await.is_err() {
        tracing::debug!("output still open after processes exited, not waiting for it");
    }
    Ok(())
}

fn report_violations<W: Write>(err: &ValidationError, cli: &Cli, out: &mut W) {
    let path = match err {
        ValidationError::Envfile(_) => &cli.envfile,
        ValidationError::Procfile(_) => &cli.procfile,
    };
    for violation in err.violations() {
        let _ = writeln!(out, "{}:{}", path.display(), violation);
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Listens for SIGINT and SIGTERM.
///
/// Handlers are registered on `install`, before any child is spawned, so an
/// early signal still reaches the kill sweep.
struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use anyhow::Context;
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to listen for SIGINT")?,
            terminate: signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> ProcessSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ProcessSignal::SigInt,
            _ = self.terminate.recv() => ProcessSignal::SigTerm,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> ProcessSignal {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        ProcessSignal::SigInt
    }
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

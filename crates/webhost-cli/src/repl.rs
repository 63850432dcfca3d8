//! REPL – the interactive shell over a running browser instance.
//!
//! Supported slash-commands:
//!   /url [URL]    – show the current URL or navigate to a new one
//!   /suspend      – suspend the instance
//!   /resume       – resume the instance
//!   /hide, /show  – toggle view visibility
//!   /state        – print the lifecycle state
//!   /fps          – print the last frame-rate sample
//!   /health       – process tree verdict and memory usage
//!   /help         – show this list
//!   /quit | /exit – tear down and exit

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use webhost_health::{HealthVerdict, ProcessHealthMonitor, ProcessTable};
use webhost_runtime::BrowserSupervisor;
use webhost_types::Command;

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Url(Option<String>),
    Suspend,
    Resume,
    Hide,
    Show,
    State,
    Fps,
    Health,
    Help,
    Quit,
}

/// Whether the shell keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn parse(line: &str) -> Result<ShellCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let arg = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err(format!("too many arguments for {head}"));
    }

    let cmd = match head {
        "/url" => return Ok(ShellCommand::Url(arg)),
        "/suspend" => ShellCommand::Suspend,
        "/resume" => ShellCommand::Resume,
        "/hide" => ShellCommand::Hide,
        "/show" => ShellCommand::Show,
        "/state" => ShellCommand::State,
        "/fps" => ShellCommand::Fps,
        "/health" => ShellCommand::Health,
        "/help" => ShellCommand::Help,
        "/quit" | "/exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    match arg {
        Some(_) => Err(format!("{head} takes no arguments")),
        None => Ok(cmd),
    }
}

/// Entry point for the interactive shell.
///
/// `shutdown` is polled each iteration; when set the shell exits cleanly.
pub fn run<T: ProcessTable>(
    supervisor: &BrowserSupervisor,
    monitor: &ProcessHealthMonitor<T>,
    shutdown: Arc<AtomicBool>,
) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    while !shutdown.load(Ordering::SeqCst) {
        print!("{} ", "webhost>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(cmd) => {
                if execute(cmd, supervisor, monitor) == Flow::Quit {
                    shutdown.store(true, Ordering::SeqCst);
                }
            }
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e,
                "/help".bold()
            ),
        }
    }
}

pub fn execute<T: ProcessTable>(
    cmd: ShellCommand,
    supervisor: &BrowserSupervisor,
    monitor: &ProcessHealthMonitor<T>,
) -> Flow {
    match cmd {
        ShellCommand::Url(None) => println!("  {}", supervisor.url().bold()),
        ShellCommand::Url(Some(url)) => {
            supervisor.set_url(&url);
            println!("  {} {}", "Navigating to".green(), url.bold());
        }
        ShellCommand::Suspend => request(supervisor, Command::Suspend),
        ShellCommand::Resume => request(supervisor, Command::Resume),
        ShellCommand::Hide => supervisor.hide(true),
        ShellCommand::Show => supervisor.hide(false),
        ShellCommand::State => {
            let hidden = if supervisor.is_hidden() { " (hidden)" } else { "" };
            println!("  {}{}", supervisor.state().to_string().yellow(), hidden);
        }
        ShellCommand::Fps => println!("  {} fps", supervisor.fps().to_string().yellow()),
        ShellCommand::Health => print_health(monitor),
        ShellCommand::Help => print_help(),
        ShellCommand::Quit => {
            println!("{}", "Goodbye.".green());
            return Flow::Quit;
        }
    }
    Flow::Continue
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn request(supervisor: &BrowserSupervisor, command: Command) {
    match supervisor.request(command) {
        Ok(()) => println!("  {} {}", "✓".green(), supervisor.state()),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
}

fn print_health<T: ProcessTable>(monitor: &ProcessHealthMonitor<T>) {
    let verdict = monitor.verdict();
    let label = match &verdict {
        HealthVerdict::Unmonitored => "not monitoring".dimmed(),
        HealthVerdict::Starting => "starting".yellow(),
        HealthVerdict::Operational => "operational".green(),
        HealthVerdict::RootInactive => "root process inactive".red(),
        HealthVerdict::Degraded { .. } => "degraded".red(),
    };
    println!("{}", "Process Health".bold().underline());
    println!("  Verdict   : {label}");
    if let HealthVerdict::Degraded { missing } = &verdict {
        println!("  Missing   : {}", missing.join(", ").yellow());
    }
    println!("  Processes : {}", monitor.processes());
    println!("  Resident  : {}", format_bytes(monitor.resident()));
    println!("  Allocated : {}", format_bytes(monitor.allocated()));
    println!("  Shared    : {}", format_bytes(monitor.shared()));
    for record in monitor.processes_snapshot() {
        println!(
            "    {:>7}  {:<24} {}",
            record.pid,
            record.name,
            format_bytes(record.resident).dimmed()
        );
    }
}

fn print_help() {
    println!();
    println!("{}", "webhost Commands".bold().underline());
    println!("  {}   – show or change the URL", "/url [URL]".bold().cyan());
    println!("  {}      – suspend the instance", "/suspend".bold().cyan());
    println!("  {}       – resume the instance", "/resume".bold().cyan());
    println!("  {}  – hide or show the view", "/hide  /show".bold().cyan());
    println!("  {}        – lifecycle state", "/state".bold().cyan());
    println!("  {}          – last frame-rate sample", "/fps".bold().cyan());
    println!(
        "  {}       – process tree health (headless: no helpers required)",
        "/health".bold().cyan()
    );
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}

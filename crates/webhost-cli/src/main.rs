//! `webhost-cli` – webhost Command Line Interface
//!
//! Runs one supervised browser instance and an interactive shell over its
//! control surface. It:
//!
//! 1. Loads `~/.webhost/config.toml`, writing the defaults on first run.
//! 2. Starts the engine loop and begins monitoring the process tree.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/url`, `/suspend`, `/resume`, `/health`, `/help`, ...).
//! 4. Intercepts **Ctrl-C** to tear the engine loop down before exiting.

mod config;
mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{error, info, warn};
use webhost_health::{MandatoryProcessSet, ProcessHealthMonitor};
use webhost_middleware::{LifecycleObserver, StateObserver};
use webhost_runtime::{BrowserSupervisor, HeadlessEngine};
use webhost_types::LifecycleState;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); WEBHOST_LOG_FORMAT=json switches to
    // JSON lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = webhost_runtime::init_tracing("webhost");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::Config::from_env()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::from_env()
        }
    };

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));

    let supervisor = Arc::new(BrowserSupervisor::new(cfg.browser_config()));
    let console = Arc::new(ConsoleObserver {
        shutdown: Arc::clone(&shutdown),
    });
    if let Err(e) = supervisor.register_state_observer(console.clone()) {
        warn!(error = %e, "failed to register console state observer");
    }
    if let Err(e) = supervisor.register_lifecycle_observer(console) {
        warn!(error = %e, "failed to register console lifecycle observer");
    }

    // The headless engine spawns no helper processes, so requiring the
    // configured ones would leave the tree degraded forever.
    let settings = cfg.monitor_settings();
    if !settings.mandatory.is_empty() {
        info!(
            ignored = ?settings.mandatory,
            "headless engine: no mandatory helper processes monitored"
        );
    }
    let settings = settings.without_helpers();
    let mandatory = match MandatoryProcessSet::new(settings.mandatory) {
        Ok(set) => set,
        Err(e) => {
            error!(error = %e, "invalid mandatory process list");
            println!("{}: {}", "Config error".red(), e);
            std::process::exit(2);
        }
    };
    let monitor = ProcessHealthMonitor::new(mandatory).with_grace_period(settings.grace_period);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_supervisor = Arc::clone(&supervisor);
    let ctrlc_shutdown = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – tearing down …".yellow().bold());
        ctrlc_shutdown.store(true, Ordering::SeqCst);
        ctrlc_supervisor.shutdown();
        println!("{}", "  ✓ Engine loop stopped.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; teardown on Ctrl-C will not be available");
    }

    // ── Engine loop ───────────────────────────────────────────────────────
    if let Err(e) = supervisor.start(HeadlessEngine::factory()) {
        error!(error = %e, "engine failed to start");
        println!("{}: {}", "Engine error".red(), e);
        std::process::exit(1);
    }
    monitor.observe(std::process::id());
    if let Err(e) = supervisor.resume() {
        warn!(error = %e, "initial resume rejected");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&supervisor, &monitor, shutdown);

    monitor.observe(0);
    supervisor.shutdown();
}

// ─────────────────────────────────────────────────────────────────────────────
// Console observer
// ─────────────────────────────────────────────────────────────────────────────

/// Echoes lifecycle events to the terminal. A page asking to close its
/// window ends the shell.
struct ConsoleObserver {
    shutdown: Arc<AtomicBool>,
}

impl StateObserver for ConsoleObserver {
    fn on_state_change(&self, state: LifecycleState) {
        println!("\n  {} {}", "state →".dimmed(), state.to_string().yellow());
    }
}

impl LifecycleObserver for ConsoleObserver {
    fn on_load_finished(&self, url: &str) {
        println!("\n  {} {}", "loaded".green(), url.bold());
    }

    fn on_hidden(&self, hidden: bool) {
        let label = if hidden { "hidden" } else { "visible" };
        println!("\n  {} {}", "view →".dimmed(), label.yellow());
    }

    fn on_closure_requested(&self) {
        println!(
            "\n  {} (press Enter to exit)",
            "Page requested window close".yellow()
        );
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"                __    __               __ "#.bold().cyan());
    println!("{}", r#" _    _____ ___/ /   / /  ___  ___ ___/ /_"#.bold().cyan());
    println!("{}", r#"| |/|/ / -_) _  /   / _ \/ _ \(_-</ __/ __/"#.bold().cyan());
    println!("{}", r#"|__,__/\__/_.__/   /_//_/\___/___/\__/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "webhost".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Browser Instance Lifecycle Supervisor");
    println!();
}

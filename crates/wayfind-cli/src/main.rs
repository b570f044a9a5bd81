//! `wayfind-cli` – Wayfinding study operator console
//!
//! This binary drives the tracking core headlessly for pilot sessions and
//! backend checks.  It:
//!
//! 1. Checks for `~/.wayfind/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Probes the persistence backend (or announces offline mode).
//! 3. Loads the floor plan and trip journal, and builds the navigation loop.
//! 4. Drops the operator into an **interactive REPL** (`/login`, `/go`,
//!    `/walk`, `/status`, `/help`, …).
//! 5. Intercepts **Ctrl-C** so an active trip is closed and its metrics are
//!    emitted before exit.

mod backend;
mod config;
mod repl;
mod walker;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use wayfind_memory::TripJournal;
use wayfind_middleware::{
    spawn_dispatcher, EventBus, InMemoryGateway, PersistenceGateway, RestGateway,
    RestGatewayConfig,
};
use wayfind_runtime::{init_tracing, NavigationConfig, NavigationLoop};
use wayfind_session::SessionController;
use wayfind_spatial::FloorPlan;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); WAYFIND_LOG_FORMAT=json switches to
    // newline-delimited JSON and OTEL_EXPORTER_OTLP_ENDPOINT enables span
    // export.  Operator-facing output still uses println!.
    let _tracing = init_tracing("wayfind");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // At the prompt the line editor sees Ctrl-C itself; this covers /walk.
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing the active trip …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; walks cannot be interrupted");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return;
        }
    };
    let _rt_guard = rt.enter();

    // ── Persistence backend ───────────────────────────────────────────────
    let gateway: Arc<dyn PersistenceGateway> = if cfg.is_offline() {
        println!(
            "\n  Backend: {}  (records are kept in memory and in the journal)",
            "offline".yellow()
        );
        Arc::new(InMemoryGateway::new())
    } else {
        print!("\n  Probing backend at {} … ", cfg.backend_url.dimmed());
        match rt.block_on(backend::probe(&cfg.backend_url, cfg.api_key.expose())) {
            Ok(status) if status.is_success() => println!("{}", "online".green()),
            Ok(status) => println!(
                "{} (HTTP {}; check the API key)",
                "reachable".yellow(),
                status.as_u16()
            ),
            Err(e) => {
                println!("{}", "unreachable".red());
                println!("  {}", e.dimmed());
            }
        }
        Arc::new(RestGateway::new(RestGatewayConfig::new(
            cfg.backend_url.trim(),
            cfg.api_key.expose(),
        )))
    };

    // ── Floor plan ────────────────────────────────────────────────────────
    let plan = match &cfg.floor_plan {
        Some(path) => match FloorPlan::load(path) {
            Ok(plan) => {
                println!("  Floor plan: {}", path.display().to_string().bold());
                plan
            }
            Err(e) => {
                println!("{}: {}", "Floor plan error".red(), e);
                println!("  Falling back to the built-in plan.");
                FloorPlan::builtin()
            }
        },
        None => {
            println!("  Floor plan: {}", "built-in".bold());
            FloorPlan::builtin()
        }
    };
    let graph = match plan.build_graph() {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{}: {}", "Floor plan is not navigable".red(), e);
            return;
        }
    };

    // ── Session + navigation loop ─────────────────────────────────────────
    let mut session = SessionController::new(spawn_dispatcher(gateway), cfg.admin_code.clone());
    if let Err(e) = session.set_phase(&cfg.phase) {
        println!("{}: {}", "Config phase ignored".yellow(), e);
    }

    let mut nav = NavigationLoop::new(
        NavigationConfig {
            destinations: plan.destinations(),
            ..NavigationConfig::default()
        },
        Box::new(graph),
        session,
        EventBus::default(),
    );

    let journal = match &cfg.journal_path {
        Some(path) => TripJournal::open(path),
        None => TripJournal::open_in_memory(),
    };
    match journal {
        Ok(journal) => nav = nav.with_journal(journal),
        Err(e) => println!("{}: {} – continuing without one.", "Trip journal unavailable".yellow(), e),
    }
    nav.place_agent(plan.spawn());

    println!("  Phase: {}", nav.session().phase().to_string().bold());
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&mut nav, &cfg, &rt, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Wayfind First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up the study console.\n");

    let mut cfg = config::Config::default();

    cfg.backend_url = prompt_line("  Backend URL (empty for offline) []: ", "");
    if !cfg.is_offline() {
        cfg.api_key = config::ApiKey::new(prompt_line("  Backend API key []: ", ""));
    }

    let phase = prompt_line(&format!("  Study phase [{}]: ", cfg.phase), &cfg.phase);
    match phase.parse::<wayfind_types::Phase>() {
        Ok(p) => cfg.phase = p.to_string(),
        Err(e) => println!("  {} – keeping {}", e.to_string().yellow(), cfg.phase),
    }

    let hz = prompt_line(
        &format!("  Simulation ticks per second [{}]: ", cfg.tick_hz),
        &cfg.tick_hz.to_string(),
    );
    if let Ok(hz) = hz.trim().parse::<u32>()
        && hz > 0
    {
        cfg.tick_hz = hz;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _      __          _____         __"#.bold().cyan());
    println!("{}", r#"| | /| / /__ ___ __/ __(_)__  ___/ /"#.bold().cyan());
    println!("{}", r#"| |/ |/ / _ `/ // / _// / _ \/ _  / "#.bold().cyan());
    println!("{}", r#"|__/|__/\_,_/\_, /_/ /_/_//_/\_,_/  "#.bold().cyan());
    println!("{}", r#"            /___/                     "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Wayfind".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Indoor wayfinding usability study console");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

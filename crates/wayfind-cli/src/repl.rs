//! REPL – the operator shell around the navigation loop.
//!
//! Supported slash-commands:
//!   /help                          – show this list
//!   /login <id> [control|experimental]
//!   /logout
//!   /phase <pre-test|post-test>
//!   /destinations                  – list catalog destinations
//!   /go <name>                     – set the destination
//!   /cancel                        – cancel the active trip
//!   /walk [seconds]                – walk along the path through the tick loop
//!   /move <x> <y> <z>              – teleport the agent and run one tick
//!   /menu                          – open the help menu (help intervention)
//!   /status                        – live navigation view
//!   /journal                       – local trip journal summary
//!   /schema                        – JSON schema of the persisted record
//!   /quit | /exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;

use wayfind_runtime::NavigationLoop;
use wayfind_session::{LoginProgress, SessionState};
use wayfind_types::{Event, EventPayload, Group, MetricsRecord, Phase, TripEnd, Vec3, WayfindError};

use crate::config::Config;
use crate::walker::{self, WalkSettings};

const DEFAULT_WALK_SECONDS: f32 = 30.0;
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Time given to in-flight persist requests before the runtime is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Command parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Login { participant_id: String, group: Group },
    Logout,
    Phase(String),
    Destinations,
    Go(String),
    Cancel,
    Walk(f32),
    Move(Vec3),
    Menu,
    Status,
    Journal,
    Schema,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = parts.collect();

        match head {
            "/help" => Ok(Command::Help),
            "/login" => {
                let participant_id = args
                    .first()
                    .ok_or("usage: /login <id> [control|experimental]")?
                    .to_string();
                let group = match args.get(1) {
                    Some(g) => g.parse::<Group>().map_err(|e| e.to_string())?,
                    None => Group::Control,
                };
                Ok(Command::Login {
                    participant_id,
                    group,
                })
            }
            "/logout" => Ok(Command::Logout),
            "/phase" => args
                .first()
                .map(|p| Command::Phase(p.to_string()))
                .ok_or_else(|| "usage: /phase <pre-test|post-test>".to_string()),
            "/destinations" => Ok(Command::Destinations),
            "/go" if !args.is_empty() => Ok(Command::Go(args.join(" "))),
            "/go" => Err("usage: /go <destination>".to_string()),
            "/cancel" => Ok(Command::Cancel),
            "/walk" => match args.first() {
                None => Ok(Command::Walk(DEFAULT_WALK_SECONDS)),
                Some(raw) => match raw.parse::<f32>() {
                    Ok(s) if s.is_finite() && s > 0.0 => Ok(Command::Walk(s)),
                    _ => Err(format!("'{}' is not a positive number of seconds", raw)),
                },
            },
            "/move" => {
                let coords: Vec<f32> = args
                    .iter()
                    .map(|a| a.parse::<f32>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| "usage: /move <x> <y> <z>".to_string())?;
                match coords.as_slice() {
                    [x, y, z] => Ok(Command::Move(Vec3::new(*x, *y, *z))),
                    _ => Err("usage: /move <x> <y> <z>".to_string()),
                }
            }
            "/menu" => Ok(Command::Menu),
            "/status" => Ok(Command::Status),
            "/journal" => Ok(Command::Journal),
            "/schema" => Ok(Command::Schema),
            "/quit" | "/exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command: '{}'", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

struct Shell<'a> {
    nav: &'a mut NavigationLoop,
    rt: &'a Runtime,
    walk: WalkSettings,
    shutdown: Arc<AtomicBool>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled before every prompt and during walks.  On exit any
/// active trip is cancelled so its metrics are still emitted.
pub fn run(nav: &mut NavigationLoop, cfg: &Config, rt: &Runtime, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Line editor unavailable".red(), e);
            return;
        }
    };
    let mut events = nav.bus().subscribe();
    let mut shell = Shell {
        nav,
        rt,
        walk: WalkSettings {
            tick_hz: cfg.tick_hz,
            speed_mps: cfg.walk_speed,
            realtime: true,
        },
        shutdown,
    };

    loop {
        if shell.shutdown.load(Ordering::SeqCst) {
            break;
        }
        shell.nav.pump_session();
        print_events(&mut events);

        match editor.readline(&format!("{} ", "wayfind>".bold().cyan())) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match Command::parse(line) {
                    Ok(Command::Quit) => {
                        println!("{}", "Goodbye.".green());
                        break;
                    }
                    Ok(command) => shell.execute(command),
                    Err(msg) => println!(
                        "{} Type {} for available commands.",
                        msg.red(),
                        "/help".bold()
                    ),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
                shell.shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        print_events(&mut events);
    }

    shell.finish();
    print_events(&mut events);
}

impl Shell<'_> {
    fn execute(&mut self, command: Command) {
        match command {
            Command::Help => cmd_help(),
            Command::Login {
                participant_id,
                group,
            } => self.cmd_login(&participant_id, group),
            Command::Logout => {
                if self.nav.route_active() {
                    self.nav.cancel();
                }
                self.nav.session_mut().logout();
                println!("  Logged out.");
            }
            Command::Phase(value) => match self.nav.set_phase(&value) {
                Ok(phase) => println!("  {} {}", "✓ Phase set to".green(), phase.to_string().bold()),
                Err(e) => println!("  {} (phase stays {})", e.to_string().red(), self.nav.session().phase()),
            },
            Command::Destinations => self.cmd_destinations(),
            Command::Go(name) => match self.nav.set_destination(Some(&name)) {
                Ok(()) => self.print_view(),
                Err(e) => println!("  {}", e.to_string().red()),
            },
            Command::Cancel => {
                if self.nav.route_active() {
                    self.nav.cancel();
                    println!("  Trip cancelled.");
                } else {
                    println!("  {}", "No active destination.".dimmed());
                }
            }
            Command::Walk(seconds) => self.cmd_walk(seconds),
            Command::Move(position) => {
                let dt = 1.0 / self.walk.tick_hz.max(1) as f32;
                self.nav.tick(position, dt);
                self.print_view();
            }
            Command::Menu => match self.nav.record_help_intervention() {
                Some(total) => println!("  Help menu opened ({} intervention(s) this trip).", total),
                None => println!("  Help menu opened {}.", "(no trip is being recorded)".dimmed()),
            },
            Command::Status => self.cmd_status(),
            Command::Journal => self.cmd_journal(),
            Command::Schema => cmd_schema(),
            Command::Quit => {}
        }
    }

    fn cmd_login(&mut self, participant_id: &str, group: Group) {
        match self.nav.login(participant_id, group) {
            Ok(LoginProgress::Admin) => {
                println!("  {} – all aids shown, nothing recorded.", "Admin session".bold().yellow());
            }
            Ok(LoginProgress::Pending { attempt }) => {
                println!("  Registering {} (attempt {}) …", participant_id.bold(), attempt);
                let waited = self.rt.block_on(tokio::time::timeout(
                    REGISTRATION_TIMEOUT,
                    self.nav.session_mut().await_registration(),
                ));
                match waited {
                    Ok(Ok(handle)) => println!("  {} {}", "✓ Registered as".green(), handle.as_str().bold()),
                    Ok(Err(WayfindError::DuplicateRegistration(id))) => println!(
                        "  {} '{}' already took part; use another id.",
                        "Already registered:".yellow(),
                        id
                    ),
                    Ok(Err(e)) => println!("  {}: {} – try /login again.", "Registration failed".red(), e),
                    Err(_) => println!(
                        "  {}",
                        "Backend has not answered yet; trips are queued until it does.".yellow()
                    ),
                }
            }
            Err(e) => println!("  {}", e.to_string().red()),
        }
    }

    fn cmd_destinations(&self) {
        let current = self.nav.view().destination;
        println!("{}", "Destinations".bold().underline());
        for d in self.nav.destinations() {
            let marker = if d.name == current { "▶" } else { " " };
            println!("  {} {:<16} {}", marker.green(), d.name.bold(), d.position.to_string().dimmed());
        }
    }

    fn cmd_walk(&mut self, seconds: f32) {
        if !self.nav.route_active() {
            println!("  {}", "Set a destination first (/go <name>).".yellow());
            return;
        }
        let summary = walker::walk(self.nav, seconds, self.walk, &self.shutdown);
        println!(
            "  Walked {:.1} s ({} ticks){}.",
            summary.elapsed_s,
            summary.ticks,
            if summary.interrupted { " – interrupted" } else { "" }
        );
        self.print_view();
    }

    fn cmd_status(&self) {
        let session = self.nav.session();
        let who = match session.state() {
            SessionState::LoggedOut => "logged out".to_string(),
            SessionState::Registering { participant_id, .. } => format!("{} (registering)", participant_id),
            SessionState::Active {
                participant_id,
                group,
                ..
            } => format!("{} ({})", participant_id, group),
            SessionState::Admin => "admin".to_string(),
        };
        println!("{}", "Status".bold().underline());
        println!("  Session  : {}  phase {}", who.bold(), session.phase());
        if session.pending_records() > 0 {
            println!("  Pending  : {} record(s) waiting for registration", session.pending_records());
        }
        if let Some(p) = self.nav.agent_position() {
            println!("  Position : {}", p);
        }
        self.print_view();
        if let Some(trip) = self.nav.trip_progress() {
            println!(
                "  Trip     : {:.1} s, {:.1} m walked, {} deviation(s), {} error(s), {} help",
                trip.time_seconds,
                trip.distance_meters,
                trip.deviation_count,
                trip.error_count,
                trip.help_interventions
            );
        }
    }

    fn cmd_journal(&self) {
        let Some(journal) = self.nav.journal() else {
            println!("  {}", "No trip journal attached.".dimmed());
            return;
        };
        let summary = match journal.summary() {
            Ok(s) => s,
            Err(e) => {
                println!("  {}: {}", "Journal error".red(), e);
                return;
            }
        };
        println!("{}", "Trip Journal".bold().underline());
        println!(
            "  {} trip(s), {} reached, mean route match {:.1}%, mean time {:.1} s",
            summary.trips, summary.reached, summary.mean_route_match, summary.mean_time_seconds
        );
        for phase in [Phase::PreTest, Phase::PostTest] {
            match journal.entries_for_phase(phase) {
                Ok(entries) if !entries.is_empty() => {
                    println!("  {}", phase.to_string().bold());
                    for e in entries {
                        println!(
                            "    {} {:<6} {:<14} {:>6.1}% {:>6.1} s {}",
                            e.recorded_at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string().dimmed(),
                            e.participant_id.as_deref().unwrap_or("-"),
                            e.metrics.destination_name,
                            e.metrics.route_match_percent,
                            e.metrics.time_seconds,
                            if e.metrics.reached_destination { "✓".green() } else { "✗".red() }
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => println!("  {}: {}", "Journal error".red(), e),
            }
        }
    }

    fn print_view(&self) {
        let view = self.nav.view();
        let eta = view
            .eta_seconds
            .map(|s| format!("{:.0} s", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  Route    : {}  {:.1} / {:.1} m left ({:.0}%)  ETA {}{}{}",
            view.destination.bold(),
            view.remaining_m,
            view.total_m,
            view.progress * 100.0,
            eta,
            if view.off_path { "  OFF PATH".red().to_string() } else { String::new() },
            if view.tracking { "  ●rec".red().to_string() } else { String::new() },
        );
        if view.aids_visible && view.path.len() > 1 {
            let corners: Vec<String> = view.path.iter().map(|p| p.to_string()).collect();
            println!("  Path     : {}", corners.join(" → ").dimmed());
        }
    }

    /// Close the active trip and give pending requests a moment to land.
    fn finish(&mut self) {
        if self.nav.route_active() {
            self.nav.cancel();
        }
        self.rt.block_on(tokio::time::sleep(SHUTDOWN_GRACE));
        self.nav.pump_session();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Wayfind Commands".bold().underline());
    println!("  {}  – start a session", "/login <id> [control|experimental]".bold().cyan());
    println!("  {}                             – end the session", "/logout".bold().cyan());
    println!("  {}     – set the evaluation phase", "/phase <pre-test|post-test>".bold().cyan());
    println!("  {}                       – list destinations", "/destinations".bold().cyan());
    println!("  {}                           – set the destination", "/go <name>".bold().cyan());
    println!("  {}                             – cancel the trip", "/cancel".bold().cyan());
    println!("  {}                     – walk along the path", "/walk [seconds]".bold().cyan());
    println!("  {}                   – teleport and tick once", "/move <x> <y> <z>".bold().cyan());
    println!("  {}                               – open the help menu", "/menu".bold().cyan());
    println!("  {}                             – live navigation view", "/status".bold().cyan());
    println!("  {}                            – local trip journal", "/journal".bold().cyan());
    println!("  {}                             – persisted record schema", "/schema".bold().cyan());
    println!("  {}                       – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_schema() {
    let schema = schemars::schema_for!(MetricsRecord);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("{}: {}", "Schema error".red(), e),
    }
}

fn print_events(events: &mut broadcast::Receiver<Event>) {
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event.payload),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                println!("  {}", format!("({} event(s) skipped)", n).dimmed());
            }
            Err(_) => break,
        }
    }
}

fn print_event(payload: &EventPayload) {
    match payload {
        EventPayload::TripStarted {
            destination,
            optimal_length_m,
            ..
        } => println!("  ● Recording trip to {} (optimal {:.1} m)", destination.bold(), optimal_length_m),
        EventPayload::DestinationReached { destination } => {
            println!("  {} {}", "✓ Destination reached:".green().bold(), destination.bold())
        }
        EventPayload::TripEnded { destination, cause } => match cause {
            TripEnd::Reached => {}
            TripEnd::Cancelled => println!("  {}", format!("Trip to {} cancelled", destination).dimmed()),
            TripEnd::Redirected => println!("  {}", format!("Trip to {} replaced", destination).dimmed()),
            TripEnd::Unreachable => println!("  {}", format!("Trip to {} abandoned", destination).red()),
        },
        EventPayload::MetricsEmitted(m) => println!(
            "  Trip summary: {} – {:.1} s, {:.1} m (optimal {:.1} m), route match {:.1}%, {} deviation(s), {} error(s), {} help, {}",
            m.destination_name.bold(),
            m.time_seconds,
            m.distance_meters,
            m.optimal_length_m,
            m.route_match_percent,
            m.deviation_count,
            m.error_count,
            m.help_interventions,
            if m.reached_destination { "reached".green() } else { "not reached".yellow() }
        ),
        EventPayload::DeviationRecorded { total } => {
            println!("  {}", format!("⚠ Off the suggested path (deviation #{})", total).yellow())
        }
        EventPayload::WrongDestination { intended, nearby } => println!(
            "  {}",
            format!("⚠ Heading to {} instead of {}", nearby, intended).yellow()
        ),
        EventPayload::HelpIntervention { .. } => {}
        EventPayload::PartialPath { destination, gap_m } => println!(
            "  {}",
            format!("⚠ Path to {} ends {:.1} m short of the target", destination, gap_m).yellow()
        ),
        EventPayload::PathUnavailable { destination } => {
            println!("  {}", format!("✗ No route to {}", destination).red())
        }
        EventPayload::Registered { handle } => {
            println!("  {} {}", "✓ Session active:".green(), handle.as_str().dimmed())
        }
        EventPayload::RegistrationRejected { reason } => println!("  {}", reason.to_string().red()),
        EventPayload::RecordPersisted { trip_id } => {
            println!("  {}", format!("Record {} saved", trip_id).dimmed())
        }
        EventPayload::PersistenceFailed { trip_id, reason } => {
            println!("  {}", format!("Record {} not saved: {}", trip_id, reason).red())
        }
        EventPayload::RecordsDiscarded { count } => println!(
            "  {}",
            format!("{} queued record(s) from another participant discarded", count).yellow()
        ),
    }
}

//! Kiln CLI - binary entry point and line-oriented driver.
//!
//! # Event Loop
//!
//! ```text
//! main() -> App::new(adapter, options, http collaborators) -> run()
//!                                                              |
//!            +-------------------------------------------------+
//!            v
//!   select! { stdin line => handle_command, tick => process_events + report }
//! ```
//!
//! The tick drains collaborator events cooperatively; stdin lines become
//! commands or submissions. Nothing is rendered beyond status lines.

mod attachments;
mod commands;
mod render;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kiln_engine::{
    App, AppOptions, Attachment, Collaborators, FileBackend, KilnConfig, PersistenceAdapter,
};

use crate::commands::{COMMAND_SPECS, Command};
use crate::render::Reporter;

const TICK_DURATION: Duration = Duration::from_millis(16);

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_kiln_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with the driver output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_kiln_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in kiln_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn kiln_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.kiln/logs/kiln.log
    if let Some(config_path) = KilnConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("kiln.log"));
    }

    // Fallback: ./.kiln/logs/kiln.log
    candidates.push(PathBuf::from(".kiln").join("logs").join("kiln.log"));

    candidates
}

fn load_config() -> KilnConfig {
    match KilnConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            eprintln!("warning: {err}; continuing with defaults");
            KilnConfig::default()
        }
    }
}

fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}

struct Driver {
    app: App,
    reporter: Reporter,
    pending: Vec<Attachment>,
}

impl Driver {
    fn new(app: App) -> Self {
        let reporter = Reporter::new(&app);
        Self {
            app,
            reporter,
            pending: Vec::new(),
        }
    }

    fn tick(&mut self) {
        self.app.process_events();
        print_lines(self.reporter.observe(&self.app));
    }

    /// Returns false when the driver should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Submit(text) => self.submit(text),
            Command::Attach(path) => match attachments::read_attachment(&path) {
                Ok(attachment) => {
                    println!("attached {} ({})", attachment.name, attachment.mime_type);
                    self.pending.push(attachment);
                }
                Err(e) => println!("attach failed: {e:#}"),
            },
            Command::Stop => {
                if !self.app.stop() {
                    println!("nothing to stop");
                }
            }
            Command::Retry => {
                if let Err(e) = self.app.retry() {
                    println!("{e}");
                }
            }
            Command::Undo => match self.app.undo() {
                Ok(Some(_)) => println!("undone ({} messages left)", self.app.messages().len()),
                Ok(None) => println!("nothing to undo"),
                Err(e) => println!("{e}"),
            },
            Command::Clear => {
                self.app.clear();
                self.pending.clear();
                println!("cleared");
            }
            Command::View(index) => {
                if self.app.select_message(index) {
                    print_lines(render::preview_lines(self.app.preview()));
                } else {
                    println!("no message {index}");
                }
            }
            Command::Close => self.app.close_preview(),
            Command::History => print_lines(render::history_lines(self.app.messages())),
            Command::Draft(text) => {
                self.app.set_draft(text);
                println!("draft saved");
            }
            Command::Model(None) => {
                for model in self.app.models() {
                    let marker = if model.id == self.app.model().id { "*" } else { " " };
                    println!("{marker} {} ({})", model.id, model.name);
                }
            }
            Command::Model(Some(id)) => {
                if self.app.set_model(&id) {
                    println!("model: {id}");
                } else {
                    println!("unknown model {id}");
                }
            }
            Command::Help => {
                for spec in COMMAND_SPECS {
                    println!("{:<16} {}", spec.usage, spec.description);
                }
            }
            Command::Quit => return false,
            Command::Invalid(message) => println!("{message}"),
        }
        true
    }

    fn submit(&mut self, text: String) {
        let text = if text.trim().is_empty() {
            self.app.draft().to_string()
        } else {
            text
        };
        match self.app.submit(&text, &self.pending) {
            Ok(()) => self.pending.clear(),
            Err(e) => println!("{e}"),
        }
    }
}

async fn run(mut driver: Driver) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticks = tokio::time::interval(TICK_DURATION);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !driver.handle(commands::parse(&line)) {
                    break;
                }
                driver.tick();
            }
            _ = ticks.tick() => driver.tick(),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    driver.app.stop();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config();
    let data_dir = config
        .data_dir()
        .unwrap_or_else(|| PathBuf::from(".kiln").join("data"));
    let adapter = PersistenceAdapter::new(FileBackend::new(data_dir));
    let options = AppOptions::from_config(&config);
    let app = App::new(adapter, options, Collaborators::http(&config.base_url()));

    println!(
        "kiln: {} messages, model {} (/help for commands)",
        app.messages().len(),
        app.model().id
    );
    if app.session().is_none() {
        println!("not signed in: set [session] user_id in ~/.kiln/config.toml");
    }
    if !app.draft().is_empty() {
        println!("draft: {}", app.draft());
    }

    run(Driver::new(app)).await
}

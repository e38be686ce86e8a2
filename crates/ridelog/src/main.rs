//! `ridelog` - CLI for the ride telemetry recorder
//!
//! Replays sensor traces through the sampler and manages saved sessions.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use ridelog::cli::{Cli, Command, ConfigCommand, OutputFormat, RecordCommand, SessionsCommand};
use ridelog::devices::AuthProvider;
use ridelog::sampler::{SessionDocument, SESSIONS_COLLECTION};
use ridelog::sim::{
    ConsoleAlertSound, ConsoleHaptics, ReplayLocationSource, ReplayOrientationSource, StaticAuth,
    Trace,
};
use ridelog::storage::StoredDocument;
use ridelog::{
    init_logging, Collaborators, Config, SqliteDocumentStore, Storage, TelemetrySampler,
    TelemetrySnapshot,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Validation reports problems itself, so don't fail on a bad default file first.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        handle_validate(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Record(cmd) => handle_record(&config, cmd).await,
        Command::Sessions(cmd) => handle_sessions(&config, cmd),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

async fn handle_record(config: &Config, cmd: RecordCommand) -> anyhow::Result<()> {
    let trace = Trace::load(&cmd.trace)
        .with_context(|| format!("failed to load trace {}", cmd.trace.display()))?;
    if trace.is_empty() {
        bail!("trace {} has no samples", cmd.trace.display());
    }

    let auth = StaticAuth::from(&config.rider);
    if !cmd.no_save && auth.current_user().is_none() {
        bail!("no rider configured; set rider.user_id or pass --no-save");
    }

    let storage = Storage::open(config.database_path())?;
    let store = Arc::new(SqliteDocumentStore::new(storage));

    let mut sampler = TelemetrySampler::new(
        &config.telemetry,
        Collaborators {
            location: Box::new(ReplayLocationSource::new(&trace, cmd.speedup)),
            orientation: Box::new(ReplayOrientationSource::new(&trace, cmd.speedup)),
            sound: Box::new(ConsoleAlertSound::new()),
            haptics: Box::new(ConsoleHaptics::new()),
            store: store.clone(),
            auth: Box::new(auth),
        },
    )?;
    if let Some(mode) = cmd.mode {
        sampler.set_mode(mode.into());
    }

    sampler.start().await?;

    let interrupted = {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                more = sampler.process_next() => {
                    if !more {
                        break false;
                    }
                }
                _ = &mut ctrl_c => break true,
            }
        }
    };

    let snapshot = sampler.snapshot();
    sampler.stop();

    let saved = if cmd.no_save {
        None
    } else {
        match sampler.save().await {
            Ok(id) => Some(id),
            Err(e) if e.is_user_facing() => {
                eprintln!("Session not saved: {e}");
                None
            }
            Err(e) => return Err(e.into()),
        }
    };

    if let Some(max_age) = config.max_age() {
        let max_age = chrono::Duration::from_std(max_age)?;
        let pruned = store.prune_older_than(SESSIONS_COLLECTION, max_age).await?;
        if pruned > 0 {
            tracing::info!("Pruned {} expired sessions", pruned);
        }
    }

    print_record_summary(&snapshot, saved.as_deref(), interrupted, cmd.json)
}

fn print_record_summary(
    snapshot: &TelemetrySnapshot,
    saved: Option<&str>,
    interrupted: bool,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let summary = serde_json::json!({
            "snapshot": snapshot,
            "session_id": saved,
            "interrupted": interrupted,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Ride summary");
    println!("------------");
    if interrupted {
        println!("Replay interrupted.");
    }
    println!("Mode:            {}", snapshot.mode);
    println!("Points:          {}", snapshot.point_count);
    println!("Last speed:      {} km/h", snapshot.speed_kmh);
    println!("Last roll:       {}°", snapshot.roll);
    println!("Last pitch:      {}°", snapshot.pitch);
    println!("Hazard alerts:   {}", snapshot.hazard_triggers);
    println!("Dropped events:  {}", snapshot.dropped_events);
    match saved {
        Some(id) => println!("Saved as:        {id}"),
        None => println!("Saved as:        (not saved)"),
    }
    Ok(())
}

fn session_of(doc: &StoredDocument) -> Option<SessionDocument> {
    serde_json::from_value(doc.payload.clone()).ok()
}

fn handle_sessions(config: &Config, cmd: SessionsCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path())?;

    match cmd {
        SessionsCommand::List { limit, format } => {
            let docs = storage.list(SESSIONS_COLLECTION, limit)?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&docs)?);
                }
                OutputFormat::Table => {
                    println!(
                        "{:<20}  {:<25}  {:>6}  {:>9}  {:>8}",
                        "ID", "CREATED", "POINTS", "TOP km/h", "MAX LEAN"
                    );
                    for doc in &docs {
                        let (points, speed, lean) = session_of(doc).map_or((0, 0, 0), |s| {
                            (s.point_count, s.peak_speed_kmh(), s.peak_lean_deg())
                        });
                        println!(
                            "{:<20}  {:<25}  {:>6}  {:>9}  {:>7}°",
                            doc.id,
                            doc.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                            points,
                            speed,
                            lean
                        );
                    }
                }
                OutputFormat::Plain => {
                    for doc in &docs {
                        println!("{} {}", doc.id, doc.created_at.to_rfc3339());
                    }
                }
            }
            if docs.is_empty() && format != OutputFormat::Json {
                println!("No saved sessions.");
            }
        }
        SessionsCommand::Show { id, points } => {
            let Some(doc) = storage.get(SESSIONS_COLLECTION, &id)? else {
                bail!("no session with id {id}");
            };
            if points {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else if let Some(session) = session_of(&doc) {
                println!("Session {}", doc.id);
                println!("  Rider:       {}", session.user_id);
                println!("  Recorded:    {}", session.created_at.to_rfc3339());
                println!("  Points:      {}", session.point_count);
                println!("  Top speed:   {} km/h", session.peak_speed_kmh());
                println!("  Max lean:    {}°", session.peak_lean_deg());
            } else {
                println!("{}", serde_json::to_string_pretty(&doc.payload)?);
            }
        }
        SessionsCommand::Delete { id } => {
            if storage.delete(SESSIONS_COLLECTION, &id)? {
                println!("Deleted session {id}");
            } else {
                bail!("no session with id {id}");
            }
        }
        SessionsCommand::Prune { days } => {
            let days = days.unwrap_or(config.storage.max_age_days);
            if days == 0 {
                println!("Nothing to prune: no age limit given.");
                return Ok(());
            }
            let pruned =
                storage.prune_older_than(SESSIONS_COLLECTION, chrono::Duration::days(days.into()))?;
            println!("Pruned {pruned} sessions older than {days} days");
        }
        SessionsCommand::Stats => {
            let stats = storage.stats()?;
            println!("Database:        {}", storage.path().display());
            println!("Sessions:        {}", storage.count(SESSIONS_COLLECTION)?);
            println!("Documents:       {}", stats.total_documents);
            if let Some(oldest) = stats.oldest_document {
                println!("Oldest:          {}", oldest.to_rfc3339());
            }
            if let Some(newest) = stats.newest_document {
                println!("Newest:          {}", newest.to_rfc3339());
            }
            println!("Size:            {} bytes", stats.db_size_bytes);
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                let t = &config.telemetry;
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Telemetry]");
                println!("  Orientation mode:   {}", t.orientation_mode);
                println!("  Max roll angle:     {}°", t.max_roll_angle);
                println!("  Danger speed:       {} km/h", t.danger_speed_kmh);
                println!("  Danger roll:        {}°", t.danger_roll_deg);
                println!("  Orientation every:  {} ms", t.orientation_interval_ms);
                println!(
                    "  Location every:     {} ms / {} m",
                    t.location_interval_ms, t.location_distance_m
                );
                println!("  Alert sound:        {}", t.alert_sound);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max age (days):     {}", config.storage.max_age_days);
                println!();
                println!("[Rider]");
                println!(
                    "  User id:            {}",
                    config.rider.user_id.as_deref().unwrap_or("(none)")
                );
                println!("  Email verified:     {}", config.rider.email_verified);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => handle_validate(file.clone()),
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}

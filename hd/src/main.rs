//! hd - operator CLI for the haunting & escalation engine
//!
//! Inspect persona timings, stored sessions and recovery plans, and try the
//! reply classifier against the configured LLM.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use haunter::cli::{Cli, Command, get_log_path};
use haunter::config::Config;
use haunter::domain::{PersonaKind, SessionStatus};
use haunter::haunter::Persona;
use haunter::intent::{ClassifierContext, IntentRouter, LlmIntentClassifier};
use haunter::llm;
use haunter::recovery::scan_for_recovery;
use haunter::state::{SessionStore, StateManager};

fn setup_logging(level: &str) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI flag > config file > INFO
    let level = cli
        .log_level
        .clone()
        .or_else(|| Config::load_log_level(cli.config.as_ref()))
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(db_path = %config.storage.db_path.display(), "hd loaded config");

    match cli.command {
        Command::Backoff { persona, attempts } => cmd_backoff(&config, persona, attempts),
        Command::Sessions { status } => cmd_sessions(&config, status).await,
        Command::Recover { dry_run } => cmd_recover(&config, dry_run).await,
        Command::Classify { text, persona, title } => cmd_classify(&config, &text, persona, &title).await,
    }
}

/// Print the follow-up delay schedule for a persona
fn cmd_backoff(config: &Config, kind: PersonaKind, attempts: u32) -> Result<()> {
    let persona = Persona::from_config(kind, config.personas.get(kind));
    println!(
        "{} backoff (base {} min, cap {} min):",
        kind.to_string().bold(),
        persona.backoff.base,
        persona.backoff.cap
    );

    let mut elapsed = 0u64;
    for (attempt, minutes) in persona.backoff.schedule(attempts).into_iter().enumerate() {
        elapsed += u64::from(minutes);
        let tone = persona.tone_for(attempt as u32);
        println!(
            "  attempt {:>2}: {:>4} min  (+{} min total, next tone {:?})",
            attempt, minutes, elapsed, tone
        );
    }
    Ok(())
}

/// List sessions from the store
async fn cmd_sessions(config: &Config, status: Option<SessionStatus>) -> Result<()> {
    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        println!("No session store at {}", db_path.display());
        return Ok(());
    }

    let store = StateManager::spawn(db_path)?;
    let sessions = store
        .list(status)
        .await
        .map_err(|e| eyre::eyre!("Failed to list sessions: {}", e))?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for session in &sessions {
        let status = match session.status {
            SessionStatus::Complete => session.status.to_string().green(),
            SessionStatus::Cancelled => session.status.to_string().red(),
            SessionStatus::InProgress => session.status.to_string().yellow(),
            SessionStatus::NotStarted => session.status.to_string().normal(),
        };
        println!(
            "{}  {:<11} {:<12} attempt {:<3} {}",
            session.id.short(),
            session.persona,
            status,
            session.attempt,
            session.title
        );
        if let (Some(start), Some(end)) = (session.window_start, session.window_end) {
            println!("          window {} - {}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"));
        }
        if let Some(err) = &session.last_error {
            println!("          {} {}", "last error:".dimmed(), err);
        }
    }

    store.shutdown().await.ok();
    Ok(())
}

/// Show what recovery would do with the stored sessions
async fn cmd_recover(config: &Config, dry_run: bool) -> Result<()> {
    if !dry_run {
        eyre::bail!("Recovery re-arms jobs inside the host process; use --dry-run to inspect the plan");
    }

    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        println!("No session store at {}", db_path.display());
        return Ok(());
    }

    let store = StateManager::spawn(db_path)?;
    let plans = scan_for_recovery(&store, Utc::now())
        .await
        .map_err(|e| eyre::eyre!("Recovery scan failed: {}", e))?;

    if plans.is_empty() {
        println!("Nothing to recover.");
    } else {
        println!("Recovery would re-derive {} session(s):", plans.len());
        for (session, plan) in &plans {
            println!(
                "  {}  {:<13} {} ({}, attempt {})",
                session.id.short(),
                plan.to_string().cyan(),
                session.title,
                session.persona,
                session.attempt
            );
        }
    }

    store.shutdown().await.ok();
    Ok(())
}

/// Run a reply through the LLM classifier and the router's validation
async fn cmd_classify(config: &Config, text: &str, kind: PersonaKind, title: &str) -> Result<()> {
    let client = llm::create_client(&config.llm).context("Failed to create LLM client")?;
    let router = IntentRouter::new(std::sync::Arc::new(LlmIntentClassifier::new(client)));
    let persona = Persona::from_config(kind, config.personas.get(kind));

    let context = ClassifierContext {
        persona: kind,
        title: title.to_string(),
        accepted_tags: persona.accepted_tags.clone(),
        now: Utc::now(),
    };
    let action = router.classify(text, &context, persona.postpone).await;
    println!("{}", serde_json::to_string(&action)?);
    Ok(())
}

//! `crowdsafe` - CLI for the crowd-safety prediction service
//!
//! This binary runs the HTTP API and offers a few maintenance commands over
//! the same prediction store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use crowdsafe::cli::{Cli, ClearCommand, Command, ConfigCommand, HistoryCommand};
use crowdsafe::{init_logging, Config, FileStore, PredictionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let mut config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve(serve_cmd) => {
            serve_cmd.apply(&mut config);
            config.validate().context("invalid server options")?;
            crowdsafe::server::serve(&config)
                .await
                .context("server failed")
        }
        Command::Stats(stats_cmd) => handle_stats(&config, stats_cmd.json),
        Command::History(history_cmd) => handle_history(&config, &history_cmd),
        Command::Clear(clear_cmd) => handle_clear(&config, &clear_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn handle_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = FileStore::from_config(config);
    let counts = store
        .aggregate_counts()
        .context("failed to read prediction totals")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("crowdsafe stats");
        println!("---------------");
        println!("Database:      {}", store.database_path().display());
        println!("Predictions:   {}", counts.total_predictions);
        println!("  Safe:        {}", counts.safe);
        println!("  Warning:     {}", counts.warning);
        println!("  Dangerous:   {}", counts.dangerous);
    }
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let limit = cmd.limit.unwrap_or(config.storage.history_limit);
    let records = FileStore::from_config(config)
        .list_recent(limit)
        .context("failed to read prediction history")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No predictions recorded.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {}  {:<9} {:>7}  {}  @ {}",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.risk.to_string(),
            record.crowd_count,
            record.event_name,
            record.location
        );
    }
    Ok(())
}

fn handle_clear(config: &Config, cmd: &ClearCommand) -> anyhow::Result<()> {
    let store = FileStore::from_config(config);
    if !cmd.yes {
        println!(
            "This will delete all predictions from {}.",
            store.database_path().display()
        );
        println!("The CSV export at {} is kept.", store.export_path().display());
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let removed = store.clear().context("failed to clear predictions")?;
    println!("History cleared ({removed} predictions removed).");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Host:               {}", config.server.host);
                println!("  Port:               {}", config.server.port);
                match &config.server.static_dir {
                    Some(dir) => println!("  Static dir:         {}", dir.display()),
                    None => println!("  Static dir:         (none)"),
                }
                println!("  Max upload bytes:   {}", config.server.max_upload_bytes);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Export path:        {}", config.export_path().display());
                println!("  History limit:      {}", config.storage.history_limit);
                println!();
                println!("[Detection]");
                println!(
                    "  Fallback range:     {}..={}",
                    config.detection.fallback_min, config.detection.fallback_max
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

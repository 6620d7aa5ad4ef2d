//! Notes Example
//!
//! A small shell built on kiln: an in-memory note store, a plugin exposing
//! note commands on top of it, a deferred statistics plugin and an
//! auto-started telemetry plugin.
//!
//! # Lifecycle
//!
//! ```text
//! start      ── telemetry, notes (pulls in store)
//! mount      ── print the command table
//! deferred   ── stats
//! teardown   ── notes, stats, then store
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package kiln-notes -- --ignore telemetry
//! cargo run --package kiln-notes -- --teardown notes
//! ```

mod plugins;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use kiln::prelude::*;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "kiln-notes", about = "kiln plugin container demo")]
struct Cli {
    /// Configuration file (defaults to kiln.toml in the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra plugin to activate at startup
    #[arg(long = "start")]
    start: Vec<String>,

    /// Plugin to keep out of startup
    #[arg(long = "ignore")]
    ignore: Vec<String>,

    /// Plugin to deactivate before exiting
    #[arg(long, default_value = "store")]
    teardown: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ========================================================================
    // Application
    // ========================================================================

    let mut builder = Application::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    let app = builder.build()?;
    app.register_plugins(plugins::all())?;

    app.on_mount(|manager| {
        info!(
            plugins  = ?manager.list_plugins(),
            commands = ?manager.commands().list_commands(),
            "Shell mounted"
        );
    });

    // ========================================================================
    // Startup
    // ========================================================================

    let options = cli.start.iter().fold(StartOptions::new(), |o, id| o.start(id));
    let options = cli.ignore.iter().fold(options, |o, id| o.ignore(id));

    let report = app.start(options).await;
    for (id, error) in &report.failed {
        warn!(plugin = %id, %error, "Plugin did not start");
    }

    for (id, result) in app.manager().activate_deferred_plugins().await {
        if let Err(error) = result {
            warn!(plugin = %id, %error, "Deferred plugin did not start");
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    let commands = app.commands();
    if commands.has_command("notes:add") {
        commands
            .execute("notes:add", json!({ "title": "groceries", "body": "eggs, flour" }))
            .await?;
        commands
            .execute("notes:add", json!({ "title": "kiln", "body": "fire at 1200C" }))
            .await?;

        let notes = commands.execute("notes:list", json!({})).await?;
        info!(%notes, "Notes");
    }
    if commands.has_command("stats:summary") {
        let summary = commands.execute("stats:summary", json!({})).await?;
        info!(%summary, "Stats");
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    match app.manager().deactivate_plugin(&cli.teardown).await {
        Ok(order) => info!(?order, "Deactivated"),
        Err(error) => warn!(plugin = %cli.teardown, %error, "Deactivation refused"),
    }
    info!(commands = ?app.commands().list_commands(), "Remaining commands");

    Ok(())
}

//! Workspace setup, sync status and outbox commands

use super::Workspace;
use crate::QueueAction;
use anyhow::Result;
use depot_config::{Config, CONFIG_DIR};
use depot_core::{DrainOutcome, SkipReason, SqliteStore, SyncEvent};
use std::fs;
use std::path::Path;

pub async fn cmd_init() -> Result<()> {
    let root = std::env::current_dir()?;
    let depot_dir = root.join(CONFIG_DIR);

    if !depot_dir.exists() {
        fs::create_dir(&depot_dir)?;
        eprintln!("✓ Created {}/", CONFIG_DIR);
    } else {
        eprintln!("✓ {}/ already exists", CONFIG_DIR);
    }

    let config_path = Config::path_in(&root);
    if !config_path.exists() {
        fs::write(&config_path, Config::default_toml()?)?;
        eprintln!("✓ Created {}/config.toml", CONFIG_DIR);
    } else {
        eprintln!("✓ {}/config.toml already exists", CONFIG_DIR);
    }

    let config = Config::load(&root)?;
    SqliteStore::open(&config.storage_path())?;
    eprintln!("✓ Store ready at {}", config.storage_path().display());

    let gitignore_path = Path::new(".gitignore");
    let gitignore_entries = "\n# Depot\n.depot/*.db\n";
    if gitignore_path.exists() {
        let content = fs::read_to_string(gitignore_path)?;
        if !content.contains(".depot/*.db") {
            fs::write(gitignore_path, format!("{}{}", content, gitignore_entries))?;
            eprintln!("✓ Updated .gitignore");
        }
    } else {
        fs::write(gitignore_path, gitignore_entries)?;
        eprintln!("✓ Created .gitignore");
    }

    eprintln!("\n✅ Workspace initialized successfully!");
    Ok(())
}

pub async fn cmd_status(offline: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open()?;
    workspace.refresh_connectivity(offline).await?;
    let status = workspace.context.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "Backend:    {} ({})",
        workspace.remote.base_url(),
        if status.is_online { "online" } else { "offline" }
    );
    println!("Pending:    {}", status.pending);
    println!(
        "Last sync:  {}",
        status
            .last_sync
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Auto sync:  {}", if status.auto_sync { "on" } else { "off" });
    Ok(())
}

pub async fn cmd_sync(offline: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open()?;
    let context = &workspace.context;

    context.on("permanent_failure", |event| {
        if let SyncEvent::PermanentFailure(record) = event {
            eprintln!(
                "✗ Dropped {} ({} {}) after {} attempts",
                record.id, record.operation, record.collection, record.retry_count
            );
        }
    });

    workspace.refresh_connectivity(offline).await?;
    let pending = context.pending_sync_count()?;

    match context.sync_now().await? {
        DrainOutcome::Completed(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.total == 0 {
                eprintln!("✓ Nothing to sync");
            } else {
                eprintln!(
                    "✓ Synced {}/{} mutations ({} failed, {} dropped)",
                    report.succeeded, report.total, report.failed, report.dropped
                );
                let left = context.pending_sync_count()?;
                if left > 0 {
                    eprintln!("  {} still pending", left);
                }
            }
        }
        DrainOutcome::Skipped(SkipReason::Offline) => {
            eprintln!(
                "⚠ Backend {} unreachable, {} mutations kept for later",
                workspace.remote.base_url(),
                pending
            );
        }
        DrainOutcome::Skipped(SkipReason::InFlight) => {
            eprintln!("⚠ A sync is already running");
        }
    }
    Ok(())
}

pub async fn cmd_queue(action: QueueAction) -> Result<()> {
    let workspace = Workspace::open()?;
    let queue = workspace.context.queue();

    match action {
        QueueAction::List { json } => {
            let records = queue.pending()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                eprintln!("Outbox is empty");
                return Ok(());
            }

            println!(
                "{:<56} {:<8} {:<16} {:>7}  {}",
                "ID", "Op", "Collection", "Retries", "Enqueued"
            );
            println!("{}", "-".repeat(110));
            for record in records {
                println!(
                    "{:<56} {:<8} {:<16} {:>7}  {}",
                    record.id,
                    record.operation.to_string(),
                    record.collection.as_str(),
                    record.retry_count,
                    record.enqueued_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        QueueAction::Clear => {
            let discarded = queue.clear()?;
            eprintln!("✓ Discarded {} pending mutations", discarded);
        }
    }
    Ok(())
}

pub async fn cmd_pull(offline: bool) -> Result<()> {
    let workspace = Workspace::open()?;
    if !workspace.refresh_connectivity(offline).await? {
        eprintln!(
            "⚠ Backend {} unreachable, nothing pulled",
            workspace.remote.base_url()
        );
        return Ok(());
    }

    let seeded = workspace
        .context
        .initial_sync(workspace.remote.as_ref())
        .await?;
    if seeded.is_empty() {
        eprintln!("Nothing pulled");
    }
    for (collection, count) in seeded {
        eprintln!("✓ {}: {} records", collection, count);
    }
    Ok(())
}

//! `invflow review` subcommands: list, show, and decide checkpoints.
//!
//! Paused checkpoints are never decided automatically. `list --stale-hours N`
//! surfaces the ones that have waited too long so an operator can act.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use invoiceflow_core::repository::DEFAULT_LIST_LIMIT;
use invoiceflow_core::repository::checkpoint::CheckpointStore;
use invoiceflow_types::checkpoint::{CheckpointRecord, CheckpointStatus};
use invoiceflow_types::error::RepositoryError;
use invoiceflow_types::state::Decision;

use crate::http::handlers::review::{ReviewSummary, stale_cutoff};
use crate::state::AppState;

/// Status filter for `review list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFilter {
    Paused,
    Decided,
    All,
}

impl StatusFilter {
    fn to_status(self) -> Option<CheckpointStatus> {
        match self {
            Self::Paused => Some(CheckpointStatus::Paused),
            Self::Decided => Some(CheckpointStatus::Decided),
            Self::All => None,
        }
    }
}

/// Review queue subcommands.
#[derive(Subcommand)]
pub enum ReviewCommand {
    /// List checkpoints, newest first.
    #[command(alias = "ls")]
    List {
        /// Which checkpoints to show.
        #[arg(long, value_enum, default_value = "paused")]
        status: StatusFilter,

        /// Only checkpoints created more than N hours ago.
        #[arg(long)]
        stale_hours: Option<i64>,

        /// Maximum number of rows.
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: u32,
    },

    /// Show one checkpoint with its audit log.
    Show {
        checkpoint_id: String,
    },

    /// Record a reviewer decision.
    Decide {
        checkpoint_id: String,

        /// accept or reject (case-insensitive).
        #[arg(value_parser = parse_decision)]
        decision: Decision,
    },
}

fn parse_decision(s: &str) -> Result<Decision, String> {
    s.parse()
}

/// Handle a review subcommand.
pub async fn handle_review_command(cmd: ReviewCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        ReviewCommand::List {
            status,
            stale_hours,
            limit,
        } => handle_list(state, status, stale_hours, limit, json).await,
        ReviewCommand::Show { checkpoint_id } => handle_show(state, &checkpoint_id, json).await,
        ReviewCommand::Decide {
            checkpoint_id,
            decision,
        } => handle_decide(state, &checkpoint_id, decision, json).await,
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

async fn handle_list(
    state: &AppState,
    status: StatusFilter,
    stale_hours: Option<i64>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let older_than = stale_cutoff(stale_hours, Utc::now()).map_err(anyhow::Error::msg)?;
    let records = state
        .store
        .list(status.to_status(), older_than, limit)
        .await
        .context("failed to list review queue")?;

    if json {
        let summaries: Vec<ReviewSummary> = records.iter().map(ReviewSummary::from).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!("  {}", style("No checkpoints found.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Checkpoint").fg(Color::Cyan),
            Cell::new("Invoice"),
            Cell::new("Score"),
            Cell::new("Status"),
            Cell::new("Decision"),
            Cell::new("Created"),
        ]);

    for r in &records {
        let score = r
            .state
            .match_score
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let decision = r
            .decision
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&r.checkpoint_id),
            Cell::new(r.state.invoice_id.as_deref().unwrap_or("-")),
            Cell::new(score),
            format_status(r.status),
            Cell::new(decision),
            Cell::new(r.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn format_status(status: CheckpointStatus) -> Cell {
    match status {
        CheckpointStatus::Paused => Cell::new(status.as_str()).fg(Color::Yellow),
        CheckpointStatus::Decided => Cell::new(status.as_str()).fg(Color::Green),
    }
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

async fn load_record(state: &AppState, checkpoint_id: &str) -> Result<CheckpointRecord> {
    match state.store.get(checkpoint_id).await? {
        Some(record) => Ok(record),
        None => bail!("checkpoint '{checkpoint_id}' not found"),
    }
}

async fn handle_show(state: &AppState, checkpoint_id: &str, json: bool) -> Result<()> {
    let record = load_record(state, checkpoint_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let run = &record.state;
    println!();
    println!(
        "  {} Checkpoint {}",
        style("*").cyan().bold(),
        style(&record.checkpoint_id).cyan()
    );
    println!("  Status:      {}", record.status);
    println!("  Review URL:  {}", record.review_url);
    println!("  Created:     {}", record.created_at.to_rfc3339());
    if let Some(decision) = record.decision {
        println!("  Decision:    {decision}");
    }
    if let Some(at) = record.decided_at {
        println!("  Decided at:  {}", at.to_rfc3339());
    }
    println!("  Invoice:     {}", run.invoice_id.as_deref().unwrap_or("-"));
    if let Some(score) = run.match_score {
        println!("  Match score: {score:.2}");
    }
    if let Some(vendor) = &run.vendor {
        println!(
            "  Vendor:      {}",
            vendor.normalized_name.as_deref().unwrap_or(&vendor.raw_name)
        );
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Time").fg(Color::Cyan),
            Cell::new("Stage"),
            Cell::new("Event"),
            Cell::new("Message"),
        ]);
    for event in &run.logs {
        table.add_row(vec![
            Cell::new(event.ts.format("%H:%M:%S%.3f").to_string()),
            Cell::new(&event.stage),
            Cell::new(&event.event),
            Cell::new(&event.message),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Decide
// ---------------------------------------------------------------------------

async fn handle_decide(
    state: &AppState,
    checkpoint_id: &str,
    decision: Decision,
    json: bool,
) -> Result<()> {
    match state.store.set_decision(checkpoint_id, decision).await {
        Ok(()) => {}
        Err(RepositoryError::NotFound) => bail!("checkpoint '{checkpoint_id}' not found"),
        Err(e) => return Err(anyhow::Error::new(e).context("failed to record decision")),
    }

    if json {
        let out = serde_json::json!({
            "checkpoint_id": checkpoint_id,
            "decision": decision,
            "status": CheckpointStatus::Decided,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Recorded {} for checkpoint {}",
            style("*").green().bold(),
            style(decision).bold(),
            style(checkpoint_id).cyan()
        );
        println!(
            "  {}",
            style(format!("Continue the run with `invflow resume {checkpoint_id}`.")).dim()
        );
        println!();
    }
    Ok(())
}

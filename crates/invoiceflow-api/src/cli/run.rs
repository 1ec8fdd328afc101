//! `invflow run` and `invflow resume`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::{Map, Value};

use invoiceflow_core::workflow::{ResumeError, RunContext, RunError};
use invoiceflow_types::state::{RunStatus, WorkflowState};

use crate::state::AppState;

/// Parse repeated `POOL=TOOL` flags into a run context.
pub fn build_context(prefer: &[String]) -> Result<RunContext> {
    let mut ctx = RunContext::generated();
    for pair in prefer {
        let (pool, tool) = pair
            .split_once('=')
            .filter(|(p, t)| !p.trim().is_empty() && !t.trim().is_empty())
            .with_context(|| format!("invalid --prefer '{pair}', expected POOL=TOOL"))?;
        ctx = ctx.with_preferred_tool(pool.trim(), tool.trim());
    }
    Ok(ctx)
}

/// Read an invoice payload; it must be a JSON object.
pub async fn read_invoice(path: &Path) -> Result<Map<String, Value>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

pub async fn handle_run(
    state: &AppState,
    invoice: &Path,
    prefer: &[String],
    json: bool,
    quiet: bool,
) -> Result<()> {
    let raw = read_invoice(invoice).await?;
    let ctx = build_context(prefer)?;

    match state.runner.start(raw, &ctx).await {
        Ok(final_state) => {
            print_outcome(&final_state, &ctx, json, quiet)?;
            Ok(())
        }
        Err(err) => report_failure(err, json),
    }
}

pub async fn handle_resume(
    state: &AppState,
    checkpoint_id: &str,
    prefer: &[String],
    json: bool,
    quiet: bool,
) -> Result<()> {
    let ctx = build_context(prefer)?;

    match state.runner.resume(checkpoint_id, &ctx).await {
        Ok(final_state) => {
            print_outcome(&final_state, &ctx, json, quiet)?;
            Ok(())
        }
        Err(ResumeError::Load(err)) => {
            Err(anyhow::Error::new(err).context(format!("cannot resume checkpoint '{checkpoint_id}'")))
        }
        Err(ResumeError::Undecided(id)) => bail!(
            "checkpoint '{id}' has no decision yet; run `invflow review decide {id} accept|reject` first"
        ),
        Err(ResumeError::Run(err)) => report_failure(err, json),
    }
}

fn report_failure(err: RunError, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&err.state)?);
    }
    let stage = err.stage_id.clone();
    Err(anyhow::Error::new(err).context(format!("workflow failed at {stage}")))
}

fn print_outcome(state: &WorkflowState, ctx: &RunContext, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }
    if quiet {
        if state.status == RunStatus::Paused {
            if let Some(id) = &state.checkpoint_id {
                println!("{id}");
            }
        }
        return Ok(());
    }

    let status = match state.status {
        RunStatus::Completed => style(state.status.as_str()).green().bold(),
        RunStatus::Paused => style(state.status.as_str()).yellow().bold(),
        _ => style(state.status.as_str()).red().bold(),
    };

    println!();
    println!(
        "  {} Invoice {} -> {}",
        style("*").cyan().bold(),
        style(state.invoice_id.as_deref().unwrap_or("-")).cyan(),
        status
    );
    println!("  Run:          {}", style(&ctx.correlation_id).dim());
    if let Some(score) = state.match_score {
        println!("  Match score:  {score:.2}");
    }
    if let Some(stage) = &state.current_stage {
        println!("  Last stage:   {stage}");
    }
    if let Some(decision) = state.decision {
        println!("  Decision:     {decision}");
    }

    if state.status == RunStatus::Paused {
        if let Some(id) = &state.checkpoint_id {
            println!("  Checkpoint:   {}", style(id).yellow());
        }
        if let Some(url) = &state.review_url {
            println!("  Review at:    {}", style(url).underlined());
        }
        println!();
        println!(
            "  {}",
            style("Decide with `invflow review decide <checkpoint> accept|reject`, then `invflow resume <checkpoint>`.").dim()
        );
    } else if let Some(erp) = &state.erp_post_result {
        if let Some(id) = &erp.erp_invoice_id {
            println!("  ERP invoice:  {id}");
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_context_parses_pairs() {
        let ctx = build_context(&["ocr=google_vision".to_string(), " enrichment = clearbit ".to_string()]).unwrap();
        assert_eq!(ctx.preferred_tool("ocr"), Some("google_vision"));
        assert_eq!(ctx.preferred_tool("enrichment"), Some("clearbit"));
        assert!(!ctx.correlation_id.is_empty());
    }

    #[test]
    fn build_context_rejects_malformed_pairs() {
        for bad in ["ocr", "=tesseract", "ocr="] {
            let err = build_context(&[bad.to_string()]).unwrap_err();
            assert!(err.to_string().contains("expected POOL=TOOL"), "got: {err}");
        }
    }

    #[tokio::test]
    async fn read_invoice_requires_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");

        tokio::fs::write(&path, "[1, 2]").await.unwrap();
        let err = read_invoice(&path).await.unwrap_err();
        assert!(err.to_string().contains("JSON object"), "got: {err}");

        tokio::fs::write(&path, r#"{"invoice_id": "INV-1"}"#).await.unwrap();
        let map = read_invoice(&path).await.unwrap();
        assert_eq!(map["invoice_id"], "INV-1");
    }

    #[tokio::test]
    async fn demo_invoice_pauses_then_resumes() {
        use invoiceflow_core::repository::checkpoint::CheckpointStore;
        use invoiceflow_types::state::Decision;

        let (_dir, state) = crate::state::test_support::test_state().await;
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/sample_invoice.json");
        let raw = read_invoice(&demo).await.unwrap();

        let paused = state.runner.start(raw, &RunContext::new("demo")).await.unwrap();
        assert_eq!(paused.status, RunStatus::Paused);
        let id = paused.checkpoint_id.unwrap();

        state.store.set_decision(&id, Decision::Accept).await.unwrap();
        let done = state.runner.resume(&id, &RunContext::new("demo-2")).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn resume_before_decision_points_at_review_decide() {
        let (_dir, state) = crate::state::test_support::test_state().await;
        let raw = serde_json::json!({"invoice_id": "INV-3", "amount": 10, "force_mismatch": true});
        let paused = state
            .runner
            .start(raw.as_object().cloned().unwrap(), &RunContext::new("cli"))
            .await
            .unwrap();
        let id = paused.checkpoint_id.unwrap();

        let err = handle_resume(&state, &id, &[], true, true).await.unwrap_err();
        assert!(err.to_string().contains("has no decision yet"), "got: {err}");
        assert!(err.to_string().contains("review decide"), "got: {err}");
    }
}

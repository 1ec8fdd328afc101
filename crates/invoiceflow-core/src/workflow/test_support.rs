//! Shared fixtures for engine tests: the shipped workflow document and a
//! scripted `ToolInvoker` that answers every known tool deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::{Map, Value, json};

use crate::tool::{ToolError, ToolInvoker};

use super::spec::{WorkflowSpec, parse_workflow_json};

pub(crate) const WORKFLOW_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/workflow.json"));

pub(crate) fn workflow_value() -> Value {
    serde_json::from_str(WORKFLOW_JSON).unwrap()
}

pub(crate) fn sample_spec() -> WorkflowSpec {
    parse_workflow_json(WORKFLOW_JSON).unwrap()
}

/// Invoice payload used across engine tests.
pub(crate) fn invoice(force_mismatch: bool) -> Map<String, Value> {
    json!({
        "invoice_id": "INV-1001",
        "vendor": {"name": " Acme Supplies "},
        "amount": 1000,
        "po_ref": "PO-7781",
        "force_mismatch": force_mismatch,
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// Records every call and returns canned results.
#[derive(Default)]
pub(crate) struct ScriptedTools {
    calls: Mutex<Vec<(String, Value)>>,
    overrides: HashMap<String, Value>,
    missing: HashSet<String>,
}

impl ScriptedTools {
    pub(crate) fn without_tool(mut self, tool: &str) -> Self {
        self.missing.insert(tool.to_string());
        self
    }

    pub(crate) fn with_result(mut self, tool: &str, result: Value) -> Self {
        self.overrides.insert(tool.to_string(), result);
        self
    }

    /// `SERVER.tool` for every call, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn payloads(&self) -> Vec<Value> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    fn canned(tool: &str, payload: &Value) -> Option<Value> {
        let selected = payload["selected_tool"].as_str().unwrap_or("default");
        let result = match tool {
            "accept_invoice_payload" => json!({
                "invoice_id": payload["raw_payload"]["invoice_id"].as_str().unwrap_or("INV-TEST"),
                "raw_persisted": true,
            }),
            "ocr_extract" => json!({"ocr_text": format!("[OCR via {selected}] text")}),
            "parse_line_items" => json!({
                "parsed_invoice": {
                    "vendor_name": payload["vendor_name"],
                    "amount": payload["amount"],
                    "po_ref": payload["po_ref"],
                    "currency": "INR",
                },
                "line_items": [],
            }),
            "normalize_vendor" => json!({
                "normalized_name": payload["vendor_name"].as_str().unwrap_or("UNKNOWN").trim().to_uppercase(),
            }),
            "enrich_vendor" => json!({"enrichment_source": selected, "tax_id": "TAX-TEST"}),
            "compute_flags" => json!({"risk_flags": {"missing_po": false}}),
            "fetch_po" => json!({"po": {"po_ref": payload["po_ref"], "connector": selected}}),
            "fetch_grn" => json!({"grn": {"received": true, "connector": selected}}),
            "fetch_history" => json!({"history": [{"invoice_id": "INV-OLD-1"}]}),
            "compute_match_score" => {
                let mismatch = payload["raw_payload"]["force_mismatch"] == json!(true);
                json!({"match_score": if mismatch { 0.60 } else { 0.92 }})
            }
            "accept_or_reject_invoice" => json!({"ok": true}),
            "build_accounting_entries" => json!({
                "entries": [{"type": "DEBIT", "amount": payload["amount"]}],
                "currency": "INR",
            }),
            "apply_invoice_approval_policy" => json!({"approved": true, "reason": "Auto-approved"}),
            "post_to_erp" => json!({"posted": true, "erp_invoice_id": "ERP-TEST"}),
            "schedule_payment" => json!({"payment_scheduled": true, "payment_date": "2026-01-01"}),
            "notify_vendor" => json!({"vendor_notified": true}),
            "notify_finance_team" => json!({"finance_notified": true}),
            "output_final_payload" => json!({"final_payload": payload}),
            _ => return None,
        };
        Some(result)
    }
}

impl ToolInvoker for ScriptedTools {
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        payload: &Value,
    ) -> Result<Map<String, Value>, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((format!("{server}.{tool}"), payload.clone()));

        let unknown = || ToolError::UnknownTool {
            server: server.to_string(),
            tool: tool.to_string(),
        };
        if self.missing.contains(tool) {
            return Err(unknown());
        }
        let result = match self.overrides.get(tool) {
            Some(value) => value.clone(),
            None => Self::canned(tool, payload).ok_or_else(unknown)?,
        };
        Ok(result.as_object().cloned().unwrap_or_default())
    }
}

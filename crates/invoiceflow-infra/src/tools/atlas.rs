//! `ATLAS` provider group: abilities that stand in for external systems
//! (OCR, enrichment, ERP, notifications).
//!
//! Pool-bound abilities read `selected_tool` and fall back to a fixed
//! provider when the payload carries none.

use chrono::Utc;
use invoiceflow_core::workflow::payload::AbilityPayload;
use serde_json::{Value, json};
use uuid::Uuid;

use super::ToolFn;

/// Amount above which approval is escalated to a human approver.
pub const AUTO_APPROVE_LIMIT: f64 = 250_000.0;

const DEFAULT_OCR_PROVIDER: &str = "tesseract";
const DEFAULT_ENRICHMENT_PROVIDER: &str = "vendor_db";
const DEFAULT_ERP_CONNECTOR: &str = "sap_connector";

pub(super) fn lookup(tool: &str) -> Option<ToolFn> {
    let f: ToolFn = match tool {
        "ocr_extract" => ocr_extract,
        "enrich_vendor" => enrich_vendor,
        "fetch_po" => fetch_po,
        "fetch_grn" => fetch_grn,
        "fetch_history" => fetch_history,
        "apply_invoice_approval_policy" => apply_invoice_approval_policy,
        "post_to_erp" => post_to_erp,
        "schedule_payment" => schedule_payment,
        "notify_vendor" => notify_vendor,
        "notify_finance_team" => notify_finance_team,
        "accept_or_reject_invoice" => accept_or_reject_invoice,
        _ => return None,
    };
    Some(f)
}

fn selected<'a>(payload: &'a AbilityPayload, default: &'a str) -> &'a str {
    payload.selected_tool.as_deref().unwrap_or(default)
}

fn ocr_extract(payload: &AbilityPayload) -> Value {
    let provider = selected(payload, DEFAULT_OCR_PROVIDER);
    json!({ "ocr_text": format!("[OCR via {provider}] Extracted invoice text successfully.") })
}

fn enrich_vendor(payload: &AbilityPayload) -> Value {
    let provider = selected(payload, DEFAULT_ENRICHMENT_PROVIDER);
    let vendor_key = payload.normalized_name.as_deref().unwrap_or("UNKNOWN");
    json!({
        "enrichment_source": provider,
        "tax_id": "TAX-XXXX",
        "gst_id": "GST-XXXX",
        "pan_id": "PAN-XXXX",
        "credit_score": 0.78,
        "risk_score": 0.25,
        "enrichment_data": { "provider": provider, "vendor_key": vendor_key },
    })
}

fn fetch_po(payload: &AbilityPayload) -> Value {
    let connector = selected(payload, DEFAULT_ERP_CONNECTOR);
    json!({ "po": { "po_ref": payload.po_ref, "total": 1000, "connector": connector } })
}

fn fetch_grn(payload: &AbilityPayload) -> Value {
    let connector = selected(payload, DEFAULT_ERP_CONNECTOR);
    json!({ "grn": { "po_ref": payload.po_ref, "received": true, "connector": connector } })
}

fn fetch_history(payload: &AbilityPayload) -> Value {
    let connector = selected(payload, DEFAULT_ERP_CONNECTOR);
    json!({ "history": [{ "invoice_id": "INV-OLD-1", "amount": 950, "connector": connector }] })
}

fn apply_invoice_approval_policy(payload: &AbilityPayload) -> Value {
    let amount = payload.amount.unwrap_or(0.0);
    if amount > AUTO_APPROVE_LIMIT {
        return json!({
            "approved": false,
            "escalation_required": true,
            "reason": "Amount exceeds auto-approve limit",
            "approver_role": "FINANCE_MANAGER",
        });
    }
    json!({
        "approved": true,
        "escalation_required": false,
        "reason": "Auto-approved",
        "approver_role": "SYSTEM",
    })
}

fn post_to_erp(payload: &AbilityPayload) -> Value {
    let connector = selected(payload, DEFAULT_ERP_CONNECTOR);
    let id = Uuid::new_v4().simple().to_string();
    json!({ "posted": true, "erp_invoice_id": format!("ERP-{}", &id[..6]), "connector": connector })
}

fn schedule_payment(_payload: &AbilityPayload) -> Value {
    json!({
        "payment_scheduled": true,
        "payment_date": Utc::now().date_naive().format("%Y-%m-%d").to_string(),
    })
}

fn notify_vendor(_payload: &AbilityPayload) -> Value {
    json!({ "vendor_notified": true })
}

fn notify_finance_team(_payload: &AbilityPayload) -> Value {
    json!({ "finance_notified": true })
}

// Placeholder: the decision itself comes from the review queue.
fn accept_or_reject_invoice(_payload: &AbilityPayload) -> Value {
    json!({ "ok": true })
}

//! `COMMON` provider group: in-process abilities with no external system.

use invoiceflow_core::workflow::payload::AbilityPayload;
use invoiceflow_types::invoice::DEFAULT_CURRENCY;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{ToolFn, raw_f64, raw_str};

/// Amount above which an invoice is flagged `high_amount`.
pub const HIGH_AMOUNT_THRESHOLD: f64 = 100_000.0;

pub(super) fn lookup(tool: &str) -> Option<ToolFn> {
    let f: ToolFn = match tool {
        "accept_invoice_payload" => accept_invoice_payload,
        "parse_line_items" => parse_line_items,
        "normalize_vendor" => normalize_vendor,
        "compute_flags" => compute_flags,
        "compute_match_score" => compute_match_score,
        "build_accounting_entries" => build_accounting_entries,
        "output_final_payload" => output_final_payload,
        _ => return None,
    };
    Some(f)
}

fn accept_invoice_payload(payload: &AbilityPayload) -> Value {
    let raw = &payload.raw_payload;
    match raw_str(raw, "invoice_id").or_else(|| raw_str(raw, "invoice_number")) {
        Some(invoice_id) => json!({ "invoice_id": invoice_id, "raw_persisted": true }),
        None => {
            let invoice_id = format!("INV-{}", &Uuid::new_v4().simple().to_string()[..8]);
            tracing::debug!(
                invoice_id = invoice_id.as_str(),
                raw_invoice_id = ?raw.get("invoice_id"),
                "no usable invoice id in payload, generated one"
            );
            json!({ "invoice_id": invoice_id, "raw_persisted": true, "invoice_id_generated": true })
        }
    }
}

fn parse_line_items(payload: &AbilityPayload) -> Value {
    let raw = &payload.raw_payload;
    let vendor_name = payload
        .vendor_name
        .clone()
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let amount = raw_f64(raw, "amount").unwrap_or(0.0);

    let line_items = match raw.get("line_items") {
        Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
        _ => json!([{
            "description": "Service",
            "quantity": 1.0,
            "unit_price": amount,
            "amount": amount,
        }]),
    };

    json!({
        "parsed_invoice": {
            "invoice_number": raw_str(raw, "invoice_number").or_else(|| raw_str(raw, "invoice_id")),
            "vendor_name": vendor_name,
            "amount": amount,
            "currency": raw_str(raw, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            "po_ref": raw_str(raw, "po_ref"),
        },
        "line_items": line_items,
    })
}

fn normalize_vendor(payload: &AbilityPayload) -> Value {
    let name = payload.vendor_name.as_deref().unwrap_or("UNKNOWN");
    json!({ "normalized_name": name.trim().to_uppercase() })
}

fn compute_flags(payload: &AbilityPayload) -> Value {
    let parsed = &payload.parsed_invoice;
    let amount = parsed.amount.unwrap_or(0.0);
    let missing_po = matches!(parsed.po_ref.as_deref(), None | Some("") | Some("NA"));
    json!({
        "risk_flags": {
            "high_amount": amount > HIGH_AMOUNT_THRESHOLD,
            "missing_po": missing_po,
        }
    })
}

fn compute_match_score(payload: &AbilityPayload) -> Value {
    let forced = payload.raw_payload.get("force_mismatch") == Some(&Value::Bool(true));
    json!({ "match_score": if forced { 0.60 } else { 0.92 } })
}

fn build_accounting_entries(payload: &AbilityPayload) -> Value {
    let parsed = &payload.parsed_invoice;
    let amount = parsed.amount.unwrap_or(0.0);
    json!({
        "entries": [
            { "type": "DEBIT", "account": "Expense", "amount": amount },
            { "type": "CREDIT", "account": "Accounts Payable", "amount": amount },
        ],
        "currency": parsed.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
    })
}

fn output_final_payload(payload: &AbilityPayload) -> Value {
    json!({ "final_payload": payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_types::invoice::ParsedInvoice;

    fn payload(raw: Value) -> AbilityPayload {
        AbilityPayload {
            raw_payload: raw.as_object().cloned().unwrap(),
            ..AbilityPayload::default()
        }
    }

    #[test]
    fn test_accept_invoice_payload_prefers_invoice_id() {
        let out = accept_invoice_payload(&payload(json!({"invoice_id": "INV-1", "invoice_number": 7})));
        assert_eq!(out["invoice_id"], "INV-1");
        assert_eq!(out["raw_persisted"], true);

        let out = accept_invoice_payload(&payload(json!({"invoice_number": 7})));
        assert_eq!(out["invoice_id"], "7");
    }

    #[test]
    fn test_accept_invoice_payload_generates_id() {
        let out = accept_invoice_payload(&payload(json!({})));
        let id = out["invoice_id"].as_str().unwrap();
        assert!(id.starts_with("INV-"), "got: {id}");
        assert_eq!(id.len(), 12);
        assert_eq!(out["invoice_id_generated"], true);
    }

    #[test]
    fn test_accept_invoice_payload_flags_unusable_id() {
        let out = accept_invoice_payload(&payload(json!({"invoice_id": {"nested": 1}})));
        assert_eq!(out["invoice_id_generated"], true);

        let out = accept_invoice_payload(&payload(json!({"invoice_id": "INV-1"})));
        assert!(out.get("invoice_id_generated").is_none());
    }

    #[test]
    fn test_parse_line_items_defaults_single_service_line() {
        let mut p = payload(json!({"amount": 1000, "po_ref": "PO-1"}));
        p.vendor_name = Some("Acme".to_string());
        let out = parse_line_items(&p);

        assert_eq!(out["parsed_invoice"]["vendor_name"], "Acme");
        assert_eq!(out["parsed_invoice"]["currency"], "INR");
        assert_eq!(out["parsed_invoice"]["amount"], 1000.0);
        assert_eq!(out["line_items"][0]["description"], "Service");
        assert_eq!(out["line_items"][0]["unit_price"], 1000.0);
    }

    #[test]
    fn test_parse_line_items_keeps_given_lines() {
        let p = payload(json!({"line_items": [{"description": "Bolts", "amount": 5}]}));
        let out = parse_line_items(&p);
        assert_eq!(out["line_items"].as_array().unwrap().len(), 1);
        assert_eq!(out["line_items"][0]["description"], "Bolts");
        assert_eq!(out["parsed_invoice"]["vendor_name"], "UNKNOWN");
    }

    #[test]
    fn test_compute_flags() {
        let mut p = payload(json!({}));
        p.parsed_invoice = ParsedInvoice {
            amount: Some(150_000.0),
            po_ref: Some("NA".to_string()),
            ..ParsedInvoice::default()
        };
        let out = compute_flags(&p);
        assert_eq!(out["risk_flags"]["high_amount"], true);
        assert_eq!(out["risk_flags"]["missing_po"], true);
    }

    #[test]
    fn test_compute_match_score_honours_force_mismatch() {
        assert_eq!(compute_match_score(&payload(json!({"force_mismatch": true})))["match_score"], 0.60);
        assert_eq!(compute_match_score(&payload(json!({"force_mismatch": "yes"})))["match_score"], 0.92);
        assert_eq!(compute_match_score(&payload(json!({})))["match_score"], 0.92);
    }

    #[test]
    fn test_build_accounting_entries_balances() {
        let mut p = payload(json!({}));
        p.parsed_invoice.amount = Some(250.0);
        let out = build_accounting_entries(&p);
        let entries = out["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["amount"], entries[1]["amount"]);
        assert_eq!(out["currency"], "INR");
    }
}

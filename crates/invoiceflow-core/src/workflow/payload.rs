//! Request payload sent to every ability.
//!
//! The payload is an explicit projection of `WorkflowState`: a new state
//! field only reaches tools once it is added here.

use invoiceflow_types::invoice::{LineItem, ParsedInvoice};
use invoiceflow_types::state::WorkflowState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed view of state handed to a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityPayload {
    #[serde(default)]
    pub raw_payload: Map<String, Value>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub parsed_invoice: ParsedInvoice,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Vendor name as submitted (`raw_payload.vendor.name`, else `raw_payload.vendor_name`).
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub normalized_name: Option<String>,
    /// `raw_payload.po_ref`, else the parsed invoice's PO reference.
    #[serde(default)]
    pub po_ref: Option<String>,
    /// Parsed amount, else `raw_payload.amount`.
    #[serde(default)]
    pub amount: Option<f64>,
    /// Candidate chosen from the ability's tool pool, if it has one.
    #[serde(default)]
    pub selected_tool: Option<String>,
}

impl AbilityPayload {
    pub fn from_state(state: &WorkflowState, selected_tool: Option<&str>) -> Self {
        let raw = &state.raw_payload;
        let parsed = state.parsed_invoice.clone().unwrap_or_default();

        let vendor_name = raw
            .get("vendor")
            .and_then(|v| v.get("name"))
            .and_then(non_empty_str)
            .or_else(|| raw.get("vendor_name").and_then(non_empty_str));

        let po_ref = raw
            .get("po_ref")
            .and_then(non_empty_str)
            .or_else(|| parsed.po_ref.clone().filter(|s| !s.is_empty()));

        let amount = parsed
            .amount
            .or_else(|| raw.get("amount").and_then(Value::as_f64));

        Self {
            raw_payload: raw.clone(),
            attachments: state.attachments.clone(),
            ocr_text: state.ocr_text.clone(),
            line_items: state.line_items.clone(),
            vendor_name,
            normalized_name: state.vendor.as_ref().and_then(|v| v.normalized_name.clone()),
            po_ref,
            amount,
            selected_tool: selected_tool.map(str::to_string),
            parsed_invoice: parsed,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_types::invoice::VendorProfile;
    use serde_json::json;

    fn state_with(raw: Value) -> WorkflowState {
        WorkflowState::new(raw.as_object().cloned().unwrap())
    }

    #[test]
    fn test_projection_from_raw_payload() {
        let state = state_with(json!({
            "vendor": {"name": "Acme"},
            "po_ref": "PO-1",
            "amount": 1000,
            "attachments": [{"filename": "a.pdf"}]
        }));
        let payload = AbilityPayload::from_state(&state, Some("tesseract"));
        assert_eq!(payload.vendor_name.as_deref(), Some("Acme"));
        assert_eq!(payload.po_ref.as_deref(), Some("PO-1"));
        assert_eq!(payload.amount, Some(1000.0));
        assert_eq!(payload.attachments.len(), 1);
        assert_eq!(payload.selected_tool.as_deref(), Some("tesseract"));
        assert!(payload.ocr_text.is_none());
    }

    #[test]
    fn test_projection_prefers_parsed_amount_and_falls_back_for_po() {
        let mut state = state_with(json!({"vendor_name": "Globex", "amount": 5}));
        state.parsed_invoice = Some(ParsedInvoice {
            amount: Some(1200.0),
            po_ref: Some("PO-9".to_string()),
            ..ParsedInvoice::default()
        });
        state.vendor = Some(VendorProfile {
            normalized_name: Some("GLOBEX".to_string()),
            ..VendorProfile::new("Globex")
        });
        let payload = AbilityPayload::from_state(&state, None);
        assert_eq!(payload.vendor_name.as_deref(), Some("Globex"));
        assert_eq!(payload.normalized_name.as_deref(), Some("GLOBEX"));
        assert_eq!(payload.amount, Some(1200.0));
        assert_eq!(payload.po_ref.as_deref(), Some("PO-9"));
    }

    #[test]
    fn test_payload_value_has_every_projected_key() {
        let payload = AbilityPayload::from_state(&WorkflowState::default(), None).to_value();
        for key in [
            "raw_payload",
            "attachments",
            "ocr_text",
            "parsed_invoice",
            "line_items",
            "vendor_name",
            "normalized_name",
            "po_ref",
            "amount",
            "selected_tool",
        ] {
            assert!(payload.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(payload["parsed_invoice"], json!({}));
    }
}

//! Ability registry and result merge rules.
//!
//! `Ability` is a closed set: every ability the engine can run has a variant
//! here, and every variant has exactly one rule describing how its tool
//! result is folded into `WorkflowState`. Adding an ability without a merge
//! rule does not compile.

use std::fmt;
use std::str::FromStr;

use invoiceflow_types::invoice::{
    AccountingEntries, ApprovalResult, DEFAULT_CURRENCY, LineItem, ParsedInvoice, VendorProfile,
};
use invoiceflow_types::state::WorkflowState;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A tool result that does not fit the shape its merge rule expects.
#[derive(Debug, Error)]
#[error("field '{field}': {reason}")]
pub struct MergeError {
    pub field: String,
    pub reason: String,
}

impl MergeError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every ability known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ability {
    AcceptInvoicePayload,
    OcrExtract,
    ParseLineItems,
    NormalizeVendor,
    EnrichVendor,
    ComputeFlags,
    FetchPo,
    FetchGrn,
    FetchHistory,
    ComputeMatchScore,
    AcceptOrRejectInvoice,
    BuildAccountingEntries,
    ApplyInvoiceApprovalPolicy,
    PostToErp,
    SchedulePayment,
    NotifyVendor,
    NotifyFinanceTeam,
    OutputFinalPayload,
}

impl Ability {
    pub const ALL: [Ability; 18] = [
        Self::AcceptInvoicePayload,
        Self::OcrExtract,
        Self::ParseLineItems,
        Self::NormalizeVendor,
        Self::EnrichVendor,
        Self::ComputeFlags,
        Self::FetchPo,
        Self::FetchGrn,
        Self::FetchHistory,
        Self::ComputeMatchScore,
        Self::AcceptOrRejectInvoice,
        Self::BuildAccountingEntries,
        Self::ApplyInvoiceApprovalPolicy,
        Self::PostToErp,
        Self::SchedulePayment,
        Self::NotifyVendor,
        Self::NotifyFinanceTeam,
        Self::OutputFinalPayload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptInvoicePayload => "accept_invoice_payload",
            Self::OcrExtract => "ocr_extract",
            Self::ParseLineItems => "parse_line_items",
            Self::NormalizeVendor => "normalize_vendor",
            Self::EnrichVendor => "enrich_vendor",
            Self::ComputeFlags => "compute_flags",
            Self::FetchPo => "fetch_po",
            Self::FetchGrn => "fetch_grn",
            Self::FetchHistory => "fetch_history",
            Self::ComputeMatchScore => "compute_match_score",
            Self::AcceptOrRejectInvoice => "accept_or_reject_invoice",
            Self::BuildAccountingEntries => "build_accounting_entries",
            Self::ApplyInvoiceApprovalPolicy => "apply_invoice_approval_policy",
            Self::PostToErp => "post_to_erp",
            Self::SchedulePayment => "schedule_payment",
            Self::NotifyVendor => "notify_vendor",
            Self::NotifyFinanceTeam => "notify_finance_team",
            Self::OutputFinalPayload => "output_final_payload",
        }
    }

    /// Fold a tool result into `state`.
    pub fn merge(&self, state: &mut WorkflowState, mut result: Map<String, Value>) -> Result<(), MergeError> {
        match self {
            Self::AcceptInvoicePayload => {
                let invoice_id: String = take(&mut result, "invoice_id")?
                    .ok_or_else(|| MergeError::new("invoice_id", "missing from result"))?;
                state.invoice_id = Some(invoice_id);
            }
            Self::OcrExtract => {
                state.ocr_text = Some(take(&mut result, "ocr_text")?.unwrap_or_default());
            }
            Self::ParseLineItems => {
                let parsed: ParsedInvoice = take(&mut result, "parsed_invoice")?.unwrap_or_default();
                let items: Vec<LineItem> = take(&mut result, "line_items")?.unwrap_or_default();
                if state.vendor.is_none() {
                    let raw_name = parsed.vendor_name.clone().unwrap_or_else(|| "UNKNOWN".to_string());
                    state.vendor = Some(VendorProfile::new(raw_name));
                }
                state.parsed_invoice = Some(parsed);
                state.line_items = items;
            }
            Self::NormalizeVendor => {
                let normalized: Option<String> = take(&mut result, "normalized_name")?;
                state.vendor.get_or_insert_with(VendorProfile::default).normalized_name = normalized;
            }
            Self::EnrichVendor => {
                state.vendor = Some(merge_record("vendor", state.vendor.take(), result)?);
            }
            Self::ComputeFlags => {
                state.risk_flags = Some(take(&mut result, "risk_flags")?.unwrap_or_default());
            }
            Self::FetchPo | Self::FetchGrn | Self::FetchHistory => {
                state.retrieval = Some(merge_record("retrieval", state.retrieval.take(), result)?);
            }
            Self::ComputeMatchScore => {
                state.match_score = Some(take(&mut result, "match_score")?.unwrap_or(0.0));
            }
            Self::AcceptOrRejectInvoice => {
                state.hitl_tool_result = Some(Value::Object(result));
            }
            Self::BuildAccountingEntries => {
                state.accounting_entries = Some(AccountingEntries {
                    entries: take(&mut result, "entries")?.unwrap_or_default(),
                    currency: take(&mut result, "currency")?
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                });
            }
            Self::ApplyInvoiceApprovalPolicy => {
                let approval: ApprovalResult = serde_json::from_value(Value::Object(result))
                    .map_err(|e| MergeError::new("approval_result", e.to_string()))?;
                state.approval_result = Some(approval);
            }
            Self::PostToErp | Self::SchedulePayment => {
                state.erp_post_result =
                    Some(merge_record("erp_post_result", state.erp_post_result.take(), result)?);
            }
            Self::NotifyVendor | Self::NotifyFinanceTeam => {
                state
                    .notify_result
                    .insert(self.as_str().to_string(), Value::Object(result));
            }
            Self::OutputFinalPayload => {
                let payload = result
                    .remove("final_payload")
                    .filter(|v| !v.is_null())
                    .unwrap_or_else(|| Value::Object(Map::new()));
                state.final_payload = Some(payload);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown ability '{s}'"))
    }
}

/// Remove `key` from the result and deserialize it. Absent and `null` both
/// yield `None`.
fn take<T: DeserializeOwned>(result: &mut Map<String, Value>, key: &str) -> Result<Option<T>, MergeError> {
    match result.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MergeError::new(key, e.to_string())),
    }
}

/// Overlay every key of `result` onto an existing record. Keys the record
/// models are type-checked; the rest land in its flattened extra map.
fn merge_record<T>(field: &str, current: Option<T>, result: Map<String, Value>) -> Result<T, MergeError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let current = current.unwrap_or_default();
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return Err(MergeError::new(field, e.to_string())),
    };
    merged.extend(result);
    serde_json::from_value(Value::Object(merged)).map_err(|e| MergeError::new(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_names_roundtrip_through_from_str() {
        for ability in Ability::ALL {
            assert_eq!(ability.as_str().parse::<Ability>().unwrap(), ability);
        }
        assert!("teleport".parse::<Ability>().is_err());
    }

    #[test]
    fn test_accept_invoice_payload_requires_invoice_id() {
        let mut state = WorkflowState::default();
        let err = Ability::AcceptInvoicePayload
            .merge(&mut state, obj(json!({"raw_persisted": true})))
            .unwrap_err();
        assert_eq!(err.field, "invoice_id");

        Ability::AcceptInvoicePayload
            .merge(&mut state, obj(json!({"invoice_id": "INV-9"})))
            .unwrap();
        assert_eq!(state.invoice_id.as_deref(), Some("INV-9"));
    }

    #[test]
    fn test_parse_line_items_initialises_vendor_once() {
        let mut state = WorkflowState::default();
        Ability::ParseLineItems
            .merge(
                &mut state,
                obj(json!({
                    "parsed_invoice": {"vendor_name": "Acme", "amount": 1000},
                    "line_items": [{"description": "Service", "quantity": 1, "unit_price": 1000.0, "amount": 1000.0}]
                })),
            )
            .unwrap();
        assert_eq!(state.vendor.as_ref().unwrap().raw_name, "Acme");
        assert_eq!(state.line_items.len(), 1);
        assert_eq!(state.parsed_invoice.as_ref().unwrap().amount, Some(1000.0));

        state.vendor.as_mut().unwrap().normalized_name = Some("ACME".to_string());
        Ability::ParseLineItems
            .merge(&mut state, obj(json!({"parsed_invoice": {"vendor_name": "Other"}})))
            .unwrap();
        let vendor = state.vendor.as_ref().unwrap();
        assert_eq!(vendor.raw_name, "Acme");
        assert_eq!(vendor.normalized_name.as_deref(), Some("ACME"));
        assert!(state.line_items.is_empty());
    }

    #[test]
    fn test_enrich_vendor_merges_all_keys() {
        let mut state = WorkflowState {
            vendor: Some(VendorProfile {
                raw_name: "Acme".to_string(),
                normalized_name: Some("ACME".to_string()),
                ..VendorProfile::default()
            }),
            ..WorkflowState::default()
        };
        Ability::EnrichVendor
            .merge(
                &mut state,
                obj(json!({
                    "enrichment_source": "vendor_db",
                    "tax_id": "TAX-XXXX",
                    "credit_score": 0.78,
                    "enrichment_data": {"provider": "vendor_db"},
                    "duns": "42"
                })),
            )
            .unwrap();
        let vendor = state.vendor.unwrap();
        assert_eq!(vendor.raw_name, "Acme");
        assert_eq!(vendor.normalized_name.as_deref(), Some("ACME"));
        assert_eq!(vendor.tax_id.as_deref(), Some("TAX-XXXX"));
        assert_eq!(vendor.credit_score, Some(0.78));
        assert_eq!(vendor.enrichment_data["provider"], json!("vendor_db"));
        assert_eq!(vendor.extra["duns"], json!("42"));
    }

    #[test]
    fn test_retrieval_accumulates_by_kind() {
        let mut state = WorkflowState::default();
        Ability::FetchPo
            .merge(&mut state, obj(json!({"po": {"po_ref": "PO-1", "total": 1000}})))
            .unwrap();
        Ability::FetchGrn
            .merge(&mut state, obj(json!({"grn": {"received": true}})))
            .unwrap();
        Ability::FetchHistory
            .merge(&mut state, obj(json!({"history": [{"invoice_id": "INV-OLD-1"}]})))
            .unwrap();
        let retrieval = state.retrieval.unwrap();
        assert_eq!(retrieval.po.unwrap()["po_ref"], json!("PO-1"));
        assert_eq!(retrieval.grn.unwrap()["received"], json!(true));
        assert_eq!(retrieval.history.len(), 1);
    }

    #[test]
    fn test_match_score_defaults_to_zero() {
        let mut state = WorkflowState::default();
        Ability::ComputeMatchScore.merge(&mut state, Map::new()).unwrap();
        assert_eq!(state.match_score, Some(0.0));

        let err = Ability::ComputeMatchScore
            .merge(&mut state, obj(json!({"match_score": "high"})))
            .unwrap_err();
        assert_eq!(err.field, "match_score");
    }

    #[test]
    fn test_accounting_entries_replaced_wholesale() {
        let mut state = WorkflowState::default();
        Ability::BuildAccountingEntries
            .merge(&mut state, obj(json!({"entries": [{"type": "DEBIT"}], "currency": "USD"})))
            .unwrap();
        Ability::BuildAccountingEntries
            .merge(&mut state, obj(json!({"entries": []})))
            .unwrap();
        let entries = state.accounting_entries.unwrap();
        assert!(entries.entries.is_empty());
        assert_eq!(entries.currency, "INR");
    }

    #[test]
    fn test_erp_results_merge_across_abilities() {
        let mut state = WorkflowState::default();
        Ability::PostToErp
            .merge(&mut state, obj(json!({"posted": true, "erp_invoice_id": "ERP-abc123"})))
            .unwrap();
        Ability::SchedulePayment
            .merge(&mut state, obj(json!({"payment_scheduled": true, "payment_date": "2026-01-01"})))
            .unwrap();
        let erp = state.erp_post_result.unwrap();
        assert!(erp.posted);
        assert!(erp.payment_scheduled);
        assert_eq!(erp.erp_invoice_id.as_deref(), Some("ERP-abc123"));
        assert_eq!(erp.payment_date.as_deref(), Some("2026-01-01"));
    }

    #[test]
    fn test_notify_results_keyed_by_ability() {
        let mut state = WorkflowState::default();
        Ability::NotifyVendor
            .merge(&mut state, obj(json!({"vendor_notified": true})))
            .unwrap();
        Ability::NotifyFinanceTeam
            .merge(&mut state, obj(json!({"finance_notified": true})))
            .unwrap();
        assert_eq!(state.notify_result["notify_vendor"], json!({"vendor_notified": true}));
        assert_eq!(state.notify_result["notify_finance_team"], json!({"finance_notified": true}));
    }

    #[test]
    fn test_final_payload_and_hitl_audit() {
        let mut state = WorkflowState::default();
        Ability::AcceptOrRejectInvoice
            .merge(&mut state, obj(json!({"ok": true})))
            .unwrap();
        Ability::OutputFinalPayload.merge(&mut state, Map::new()).unwrap();
        assert_eq!(state.hitl_tool_result, Some(json!({"ok": true})));
        assert_eq!(state.final_payload, Some(json!({})));
    }
}

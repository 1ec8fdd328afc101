//! Invoice data derived by the workflow stages.
//!
//! Each record is filled in by one or more abilities and stored on
//! `WorkflowState`. Records that receive open-ended tool output keep the
//! keys they do not model in an `extra` map so nothing is lost when the
//! state is persisted and reloaded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header fields extracted from the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_line_ref: Option<String>,
    /// Line attributes without a dedicated field (tax rate, HSN code, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_quantity() -> f64 {
    1.0
}

/// Vendor identity plus enrichment attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorProfile {
    #[serde(default)]
    pub raw_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gst_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_source: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub enrichment_data: Map<String, Value>,
    /// Enrichment keys without a dedicated field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VendorProfile {
    pub fn new(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            ..Self::default()
        }
    }
}

/// ERP artifacts fetched during retrieval, keyed by artifact kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grn: Option<Value>,
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Journal entries produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingEntries {
    #[serde(default)]
    pub entries: Vec<Value>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

pub const DEFAULT_CURRENCY: &str = "INR";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for AccountingEntries {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            currency: default_currency(),
        }
    }
}

/// Outcome of the approval policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResult {
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub escalation_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accumulated results of ERP posting and payment scheduling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErpPostResult {
    #[serde(default)]
    pub posted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_invoice_id: Option<String>,
    #[serde(default)]
    pub payment_scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

//! Workflow spec loading and validation.
//!
//! Turns a raw `WorkflowDocument` (JSON or YAML) into an immutable, checked
//! `WorkflowSpec`. Every invariant the engine relies on is verified here, so
//! the graph compiler and stage executor can look things up without
//! re-validating.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use invoiceflow_types::state::RunStatus;
use invoiceflow_types::workflow::{
    AbilityDefinition, REQUIRED_STAGES, StageDefinition, ToolCandidate, WorkflowDocument,
    WorkflowGlobals,
};
use thiserror::Error;

use super::ability::Ability;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a workflow spec.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// The workflow file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow must have at least one stage")]
    EmptyStages,

    /// A stage at the given position has no id.
    #[error("stage at position {0} has no id")]
    MissingStageId(usize),

    #[error("duplicate stage id: '{0}'")]
    DuplicateStage(String),

    /// A `next` edge (or router target) points at a stage that does not exist.
    #[error("stage '{stage}' references unknown stage '{target}'")]
    DanglingReference { stage: String, target: String },

    /// A stage lists an ability missing from the `abilities` table.
    #[error("stage '{stage}' uses ability '{ability}' which is not defined")]
    UndefinedAbility { stage: String, ability: String },

    /// The `abilities` table names an ability the engine does not know.
    #[error("unknown ability '{0}'")]
    UnknownAbility(String),

    #[error("ability '{ability}' references unknown tool pool '{pool}'")]
    UnknownPool { ability: String, pool: String },

    #[error("tool pool '{0}' has no candidates")]
    EmptyPool(String),

    /// One of the stages the engine attaches behavior to is absent.
    #[error("required stage '{0}' is missing")]
    MissingStage(String),

    #[error("invalid global '{name}': {reason}")]
    InvalidGlobal { name: String, reason: String },

    #[error("cycle detected involving stage '{0}'")]
    Cycle(String),
}

// ---------------------------------------------------------------------------
// WorkflowSpec
// ---------------------------------------------------------------------------

/// An ability definition resolved against the ability registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAbility {
    pub ability: Ability,
    pub definition: AbilityDefinition,
}

/// Immutable, validated workflow.
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    name: Option<String>,
    stages: Vec<StageDefinition>,
    stage_index: HashMap<String, usize>,
    abilities: BTreeMap<String, BoundAbility>,
    pools: BTreeMap<String, Vec<ToolCandidate>>,
    globals: WorkflowGlobals,
}

impl WorkflowSpec {
    /// Validate a parsed document.
    ///
    /// Checks, in order:
    /// - at least one stage; every stage has a unique, non-empty id
    /// - every `next` points at an existing stage
    /// - the stages the engine routes through are all present
    /// - every ability in the table is a known registry ability
    /// - every stage ability is defined in the table
    /// - every referenced pool exists and is non-empty
    /// - globals are within range
    pub fn from_document(doc: WorkflowDocument) -> Result<Self, ConfigError> {
        if doc.stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }

        let mut stage_index = HashMap::with_capacity(doc.stages.len());
        for (pos, stage) in doc.stages.iter().enumerate() {
            if stage.id.trim().is_empty() {
                return Err(ConfigError::MissingStageId(pos));
            }
            if stage_index.insert(stage.id.clone(), pos).is_some() {
                return Err(ConfigError::DuplicateStage(stage.id.clone()));
            }
        }

        for stage in &doc.stages {
            if let Some(next) = &stage.next {
                if !stage_index.contains_key(next) {
                    return Err(ConfigError::DanglingReference {
                        stage: stage.id.clone(),
                        target: next.clone(),
                    });
                }
            }
        }

        for required in REQUIRED_STAGES {
            if !stage_index.contains_key(required) {
                return Err(ConfigError::MissingStage(required.to_string()));
            }
        }

        let mut abilities = BTreeMap::new();
        for (name, definition) in doc.abilities {
            let ability: Ability = name
                .parse()
                .map_err(|_| ConfigError::UnknownAbility(name.clone()))?;
            if let Some(pool) = &definition.bigtool_pool {
                match doc.bigtool.pools.get(pool) {
                    None => {
                        return Err(ConfigError::UnknownPool {
                            ability: name.clone(),
                            pool: pool.clone(),
                        });
                    }
                    Some(candidates) if candidates.is_empty() => {
                        return Err(ConfigError::EmptyPool(pool.clone()));
                    }
                    Some(_) => {}
                }
            }
            abilities.insert(name, BoundAbility { ability, definition });
        }

        for stage in &doc.stages {
            let mut seen = HashSet::new();
            for ability in &stage.abilities {
                if !abilities.contains_key(ability) {
                    return Err(ConfigError::UndefinedAbility {
                        stage: stage.id.clone(),
                        ability: ability.clone(),
                    });
                }
                if !seen.insert(ability.as_str()) {
                    tracing::warn!(
                        stage = stage.id.as_str(),
                        ability = ability.as_str(),
                        "ability listed twice on the same stage"
                    );
                }
            }
        }

        validate_globals(&doc.globals)?;

        Ok(Self {
            name: doc.name,
            stages: doc.stages,
            stage_index,
            abilities,
            pools: doc.bigtool.pools,
            globals: doc.globals,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Stages in document order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn stage(&self, id: &str) -> Option<&StageDefinition> {
        self.stage_index.get(id).map(|&i| &self.stages[i])
    }

    pub fn has_stage(&self, id: &str) -> bool {
        self.stage_index.contains_key(id)
    }

    pub fn ability(&self, name: &str) -> Option<&BoundAbility> {
        self.abilities.get(name)
    }

    pub fn abilities(&self) -> impl Iterator<Item = (&str, &BoundAbility)> {
        self.abilities.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn pool(&self, name: &str) -> Option<&[ToolCandidate]> {
        self.pools.get(name).map(Vec::as_slice)
    }

    pub fn pools(&self) -> &BTreeMap<String, Vec<ToolCandidate>> {
        &self.pools
    }

    pub fn globals(&self) -> &WorkflowGlobals {
        &self.globals
    }
}

fn validate_globals(globals: &WorkflowGlobals) -> Result<(), ConfigError> {
    let threshold = globals.match_threshold;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::InvalidGlobal {
            name: "match_threshold".to_string(),
            reason: format!("must be a number in [0, 1], got {threshold}"),
        });
    }

    if globals.hitl.pause_status != RunStatus::Paused {
        return Err(ConfigError::InvalidGlobal {
            name: "hitl.pause_status".to_string(),
            reason: format!("must be PAUSED, got {}", globals.hitl.pause_status),
        });
    }

    match globals.hitl.reject_status {
        RunStatus::RequiresManualHandling | RunStatus::Failed => {}
        other => {
            return Err(ConfigError::InvalidGlobal {
                name: "hitl.reject_status".to_string(),
                reason: format!("must be REQUIRES_MANUAL_HANDLING or FAILED, got {other}"),
            });
        }
    }

    if globals.review_url_base.trim().is_empty() {
        return Err(ConfigError::InvalidGlobal {
            name: "review_url_base".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a JSON workflow document.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowSpec, ConfigError> {
    let doc: WorkflowDocument =
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
    WorkflowSpec::from_document(doc)
}

/// Parse and validate a YAML workflow document.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowSpec, ConfigError> {
    let doc: WorkflowDocument =
        serde_yaml_ng::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
    WorkflowSpec::from_document(doc)
}

/// Load a workflow file. `.yaml`/`.yml` files are parsed as YAML, anything
/// else as JSON.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowSpec, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if is_yaml {
        parse_workflow_yaml(&content)
    } else {
        parse_workflow_json(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

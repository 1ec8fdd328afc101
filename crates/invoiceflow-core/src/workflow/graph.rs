//! Stage graph compilation and routing.
//!
//! A `WorkflowSpec` compiles into two graphs that share every stage:
//!
//! - **Main**: entered at `INTAKE`; the checkpoint stage is a hard stop, so a
//!   run that needs review ends there with status `PAUSED`.
//! - **Resume**: entered at `HITL_DECISION`; flows on to completion.
//!
//! Linear stages follow their `next` edge. The match stage and the decision
//! stage carry a `Router` that picks the successor from the current state.
//! `petgraph` is used to reject graphs whose possible transitions form a
//! cycle, since the runner follows edges until it reaches the end.

use std::collections::HashMap;
use std::fmt;

use invoiceflow_types::state::{Decision, WorkflowState};
use invoiceflow_types::workflow::{
    CHECKPOINT_STAGE, COMPLETE_STAGE, DECISION_STAGE, INTAKE_STAGE, MATCH_STAGE,
    RECONCILE_STAGE, WorkflowGlobals,
};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde_json::json;

use super::spec::{ConfigError, WorkflowSpec};

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// Conditional successor selection for branch stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Router {
    /// `match_score < match_threshold` -> checkpoint, else reconcile.
    MatchThreshold,
    /// `decision == ACCEPT` -> reconcile, anything else -> complete.
    HitlDecision,
}

impl Router {
    /// Every stage this router can return.
    pub fn targets(&self) -> [&'static str; 2] {
        match self {
            Self::MatchThreshold => [CHECKPOINT_STAGE, RECONCILE_STAGE],
            Self::HitlDecision => [RECONCILE_STAGE, COMPLETE_STAGE],
        }
    }

    /// Pick the next stage and record the decision in the audit log.
    pub fn route(&self, state: &mut WorkflowState, globals: &WorkflowGlobals) -> &'static str {
        match self {
            Self::MatchThreshold => {
                let threshold = globals.match_threshold;
                let match_score = state.match_score.unwrap_or(0.0);
                let target = if match_score < threshold {
                    CHECKPOINT_STAGE
                } else {
                    RECONCILE_STAGE
                };
                state.log_event(
                    MATCH_STAGE,
                    "route_decision",
                    "Routing based on match_score threshold",
                    json!({
                        "match_score": match_score,
                        "threshold": threshold,
                        "next": target,
                    }),
                );
                tracing::info!(match_score, threshold, next = target, "match routed");
                target
            }
            Self::HitlDecision => {
                let target = match state.decision {
                    Some(Decision::Accept) => RECONCILE_STAGE,
                    _ => COMPLETE_STAGE,
                };
                state.log_event(
                    DECISION_STAGE,
                    "route_decision",
                    "Routing based on human decision",
                    json!({
                        "decision": state.decision,
                        "next": target,
                    }),
                );
                tracing::info!(
                    decision = ?state.decision,
                    next = target,
                    "decision routed"
                );
                target
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled graph
// ---------------------------------------------------------------------------

/// Which compilation of the workflow a graph is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    Main,
    Resume,
}

impl GraphMode {
    pub fn entry_stage(&self) -> &'static str {
        match self {
            Self::Main => INTAKE_STAGE,
            Self::Resume => DECISION_STAGE,
        }
    }
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Resume => f.write_str("resume"),
        }
    }
}

/// Outgoing edge of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    /// Run ends after this stage.
    End,
    /// Unconditional successor.
    Next(String),
    /// Successor chosen at runtime.
    Branch(Router),
}

/// An executable stage graph.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    mode: GraphMode,
    entry: String,
    edges: HashMap<String, Edge>,
}

impl CompiledGraph {
    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn edge(&self, stage_id: &str) -> Option<&Edge> {
        self.edges.get(stage_id)
    }

    pub fn contains(&self, stage_id: &str) -> bool {
        self.edges.contains_key(stage_id)
    }

    /// All stages reachable in one step from `stage_id`.
    pub fn successors(&self, stage_id: &str) -> Vec<&str> {
        match self.edges.get(stage_id) {
            None | Some(Edge::End) => Vec::new(),
            Some(Edge::Next(next)) => vec![next.as_str()],
            Some(Edge::Branch(router)) => router.targets().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Builds `CompiledGraph`s from a validated spec.
pub struct GraphCompiler;

impl GraphCompiler {
    /// Compile one graph.
    ///
    /// Edge rules, first match wins:
    /// 1. `terminal: true` -> end
    /// 2. match stage -> `Router::MatchThreshold`
    /// 3. decision stage -> `Router::HitlDecision`
    /// 4. checkpoint stage in main mode -> end
    /// 5. `next` set -> that stage, otherwise end
    pub fn compile(spec: &WorkflowSpec, mode: GraphMode) -> Result<CompiledGraph, ConfigError> {
        let mut edges = HashMap::with_capacity(spec.stages().len());

        for stage in spec.stages() {
            let id = stage.id.as_str();
            let edge = if stage.terminal {
                Edge::End
            } else if id == MATCH_STAGE {
                Edge::Branch(Router::MatchThreshold)
            } else if id == DECISION_STAGE {
                Edge::Branch(Router::HitlDecision)
            } else if mode == GraphMode::Main && id == CHECKPOINT_STAGE {
                Edge::End
            } else {
                match &stage.next {
                    Some(next) => Edge::Next(next.clone()),
                    None => Edge::End,
                }
            };
            edges.insert(stage.id.clone(), edge);
        }

        let graph = CompiledGraph {
            mode,
            entry: mode.entry_stage().to_string(),
            edges,
        };

        for stage in spec.stages() {
            for target in graph.successors(&stage.id) {
                if !spec.has_stage(target) {
                    return Err(ConfigError::DanglingReference {
                        stage: stage.id.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        if !spec.has_stage(&graph.entry) {
            return Err(ConfigError::MissingStage(graph.entry.clone()));
        }

        check_acyclic(spec, &graph)?;

        tracing::debug!(mode = %mode, entry = graph.entry.as_str(), stages = graph.edges.len(), "stage graph compiled");
        Ok(graph)
    }

    /// Compile the main and resume graphs together.
    pub fn compile_both(spec: &WorkflowSpec) -> Result<(CompiledGraph, CompiledGraph), ConfigError> {
        Ok((
            Self::compile(spec, GraphMode::Main)?,
            Self::compile(spec, GraphMode::Resume)?,
        ))
    }
}

fn check_acyclic(spec: &WorkflowSpec, graph: &CompiledGraph) -> Result<(), ConfigError> {
    let mut dag = DiGraph::<&str, ()>::new();
    let nodes: HashMap<&str, _> = spec
        .stages()
        .iter()
        .map(|s| (s.id.as_str(), dag.add_node(s.id.as_str())))
        .collect();

    for stage in spec.stages() {
        for target in graph.successors(&stage.id) {
            if let (Some(&from), Some(&to)) = (nodes.get(stage.id.as_str()), nodes.get(target)) {
                dag.add_edge(from, to, ());
            }
        }
    }

    toposort(&dag, None).map_err(|cycle| ConfigError::Cycle(dag[cycle.node_id()].to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scheduling lane. Priority order is `Control(0) < Data(1) < Telemetry(2)`,
/// lowest number dispatched first — the sole determinism mechanism for lane
/// ordering in the topological regime (§4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Control,
    Data,
    Telemetry,
}

impl Lane {
    /// Tie-break priority: lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Control => 0,
            Self::Data => 1,
            Self::Telemetry => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Data => "data",
            Self::Telemetry => "telemetry",
        }
    }

    /// Telemetry overflow is non-blocking; Data/Control overflow is terminal.
    pub fn overflow_is_blocking(&self) -> bool {
        !matches!(self, Self::Telemetry)
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adaptive action the failure shaper or provider controller is allowed to
/// take. Closed set, per `allowedAdaptiveActions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveAction {
    Retry,
    ProviderSwitch,
    Degrade,
    Fallback,
}

impl AdaptiveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::ProviderSwitch => "provider_switch",
            Self::Degrade => "degrade",
            Self::Fallback => "fallback",
        }
    }
}

/// Overflow handling strategy for an edge buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStrategy {
    Block,
    DropNewest,
    DropOldest,
    Shed,
}

/// Bounded-queue policy for one edge of the execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeBufferPolicy {
    pub capacity: usize,
    #[serde(default)]
    pub fairness_key: Option<String>,
    pub strategy: BufferStrategy,
}

impl EdgeBufferPolicy {
    pub fn is_valid(&self) -> bool {
        self.capacity >= 1
    }
}

/// Per-node concurrency + fairness policy from the plan's policy surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionPolicy {
    pub concurrency_limit: u32,
    #[serde(default)]
    pub fairness_key: Option<String>,
}

/// Per-lane flow-control mode and shedding watermarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneFlowControl {
    pub mode: String,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub shedding_enabled: bool,
}

impl LaneFlowControl {
    pub fn is_valid(&self) -> bool {
        !self.mode.is_empty() && self.low_watermark <= self.high_watermark
    }
}

/// Flow control policy across all three lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowControlPolicy {
    pub control: LaneFlowControl,
    pub data: LaneFlowControl,
    pub telemetry: LaneFlowControl,
}

impl FlowControlPolicy {
    pub fn is_valid(&self) -> bool {
        self.control.is_valid() && self.data.is_valid() && self.telemetry.is_valid()
    }

    pub fn for_lane(&self, lane: Lane) -> &LaneFlowControl {
        match lane {
            Lane::Control => &self.control,
            Lane::Data => &self.data,
            Lane::Telemetry => &self.telemetry,
        }
    }
}

/// Per-scope budgets, each required to be `>= 1` ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBudgets {
    pub turn_ms: u64,
    pub node_ms: u64,
    pub path_ms: u64,
    pub edge_ms: u64,
}

impl TurnBudgets {
    pub fn is_valid(&self) -> bool {
        self.turn_ms >= 1 && self.node_ms >= 1 && self.path_ms >= 1 && self.edge_ms >= 1
    }
}

/// Replay recording level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingLevel {
    L0,
    L1,
    L2,
}

/// Recording policy: replay level plus allowed replay modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingPolicy {
    pub level: RecordingLevel,
    pub allowed_replay_modes: Vec<String>,
}

impl RecordingPolicy {
    pub fn is_valid(&self) -> bool {
        !self.allowed_replay_modes.is_empty()
    }

    /// Deduplicate `allowed_replay_modes`, preserving first occurrence order.
    pub fn dedup(&mut self) {
        dedup_preserve_order(&mut self.allowed_replay_modes);
    }
}

/// Six required, non-empty control-plane provenance references that pin a
/// turn's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProvenance {
    pub routing_view_ref: String,
    pub admission_policy_ref: String,
    pub abi_compatibility_ref: String,
    pub version_resolution_ref: String,
    pub policy_resolution_ref: String,
    pub provider_health_ref: String,
}

impl SnapshotProvenance {
    /// Returns the name of the first missing (empty) reference, if any.
    pub fn first_missing(&self) -> Option<&'static str> {
        if self.routing_view_ref.is_empty() {
            return Some("routing_view_ref");
        }
        if self.admission_policy_ref.is_empty() {
            return Some("admission_policy_ref");
        }
        if self.abi_compatibility_ref.is_empty() {
            return Some("abi_compatibility_ref");
        }
        if self.version_resolution_ref.is_empty() {
            return Some("version_resolution_ref");
        }
        if self.policy_resolution_ref.is_empty() {
            return Some("policy_resolution_ref");
        }
        if self.provider_health_ref.is_empty() {
            return Some("provider_health_ref");
        }
        None
    }

    /// Stable, sorted `(field, value)` pairs for canonicalization.
    pub fn canonical_pairs(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("abi_compatibility_ref", self.abi_compatibility_ref.as_str()),
            ("admission_policy_ref", self.admission_policy_ref.as_str()),
            ("policy_resolution_ref", self.policy_resolution_ref.as_str()),
            ("provider_health_ref", self.provider_health_ref.as_str()),
            ("routing_view_ref", self.routing_view_ref.as_str()),
            ("version_resolution_ref", self.version_resolution_ref.as_str()),
        ]
    }
}

/// Determinism context issued alongside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminismContext {
    pub seed: u64,
    pub ordering_markers: Vec<String>,
    pub merge_rule_id: String,
    pub merge_rule_version: String,
    #[serde(default)]
    pub nondeterministic_inputs: Vec<String>,
}

impl DeterminismContext {
    pub fn is_valid(&self) -> bool {
        !self.ordering_markers.is_empty() && is_merge_rule_version(&self.merge_rule_version)
    }
}

fn is_merge_rule_version(v: &str) -> bool {
    // v?N.N(.N)?
    let v = v.strip_prefix('v').unwrap_or(v);
    let parts: Vec<&str> = v.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return false;
    }
    parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Streaming handoff policy (§4.6); absent disables C6 overlap entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingHandoffPolicy {
    pub enabled: bool,
    pub stt_to_llm_enabled: bool,
    pub llm_to_tts_enabled: bool,
    pub min_partial_chars: usize,
    pub max_pending_revisions: usize,
    pub coalesce_latest_only: bool,
}

impl StreamingHandoffPolicy {
    pub fn is_valid(&self) -> bool {
        self.min_partial_chars >= 1 && self.max_pending_revisions >= 1
    }
}

/// Named MVP execution profile. `simple` carries the fixed defaults named
/// in §4.3; additional profiles may be registered by the embedding
/// application via `plan_resolver::ProfileRegistry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub name: String,
    pub budgets: TurnBudgets,
    pub provider_bindings: BTreeMap<String, String>,
    pub edge_buffer_policies: BTreeMap<String, EdgeBufferPolicy>,
    pub node_execution_policies: BTreeMap<String, NodeExecutionPolicy>,
    pub flow_control: FlowControlPolicy,
    pub recording_policy: RecordingPolicy,
}

impl ExecutionProfile {
    /// Fixed defaults for the MVP `simple` profile.
    pub fn simple() -> Self {
        let default_edge = EdgeBufferPolicy {
            capacity: 64,
            fairness_key: Some("default".to_string()),
            strategy: BufferStrategy::Shed,
        };
        let lane = LaneFlowControl {
            mode: "bounded".to_string(),
            high_watermark: 48,
            low_watermark: 16,
            shedding_enabled: true,
        };
        Self {
            name: "simple".to_string(),
            budgets: TurnBudgets { turn_ms: 30_000, node_ms: 5_000, path_ms: 10_000, edge_ms: 2_000 },
            provider_bindings: BTreeMap::from([
                ("stt".to_string(), "default-stt".to_string()),
                ("llm".to_string(), "default-llm".to_string()),
                ("tts".to_string(), "default-tts".to_string()),
            ]),
            edge_buffer_policies: BTreeMap::from([("default".to_string(), default_edge)]),
            node_execution_policies: BTreeMap::new(),
            flow_control: FlowControlPolicy { control: lane.clone(), data: lane.clone(), telemetry: lane },
            recording_policy: RecordingPolicy {
                level: RecordingLevel::L1,
                allowed_replay_modes: vec!["full".to_string()],
            },
        }
    }
}

/// A node in the execution plan's DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_id: String,
    pub node_type: String,
    pub lane: Lane,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub shed: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub allow_degrade: bool,
    #[serde(default)]
    pub allow_fallback: bool,
    #[serde(default)]
    pub concurrency_limit: u32,
    #[serde(default)]
    pub fairness_key: Option<String>,
}

/// A directed edge of the execution plan's DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}

/// DAG of nodes and edges to execute for a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl ExecutionPlan {
    /// Structural validation (§4.4.1): non-empty, unique node ids, every edge
    /// references a known node, no self-edges, acyclic.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("execution plan must have at least one node".to_string());
        }

        let mut seen = std::collections::HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.node_id.as_str()) {
                return Err(format!("duplicate node_id: {}", node.node_id));
            }
        }

        for edge in &self.edges {
            if edge.from == edge.to {
                return Err(format!("self-edge rejected: {}", edge.from));
            }
            if !seen.contains(edge.from.as_str()) {
                return Err(format!("edge references unknown node: {}", edge.from));
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(format!("edge references unknown node: {}", edge.to));
            }
        }

        if self.topological_order().is_none() {
            return Err("execution plan contains a cycle".to_string());
        }
        Ok(())
    }

    /// Kahn's algorithm over the node/edge adjacency, breaking ties among
    /// simultaneously-ready nodes by lane priority (`Control < Data <
    /// Telemetry`) then by input order. Returns `None` if the graph has a
    /// cycle (fewer than `nodes.len()` nodes could be ordered).
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let index_of: std::collections::HashMap<&str, usize> =
            self.nodes.iter().enumerate().map(|(i, n)| (n.node_id.as_str(), i)).collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let from = *index_of.get(edge.from.as_str())?;
            let to = *index_of.get(edge.to.as_str())?;
            adjacency[from].push(to);
            in_degree[to] += 1;
        }

        let mut ready: Vec<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while !ready.is_empty() {
            ready.sort_by(|&a, &b| {
                self.nodes[a].lane.priority().cmp(&self.nodes[b].lane.priority()).then(a.cmp(&b))
            });
            let next = ready.remove(0);
            order.push(self.nodes[next].node_id.clone());
            for &succ in &adjacency[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }
}

/// The frozen, hash-identified plan for one turn. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTurnPlan {
    pub turn_id: String,
    pub pipeline_version: String,
    pub plan_hash: String,
    pub graph_definition_ref: String,
    pub execution_profile: String,
    pub authority_epoch: u64,
    pub budgets: TurnBudgets,
    pub provider_bindings: BTreeMap<String, String>,
    pub edge_buffer_policies: BTreeMap<String, EdgeBufferPolicy>,
    pub node_execution_policies: BTreeMap<String, NodeExecutionPolicy>,
    pub flow_control: FlowControlPolicy,
    pub allowed_adaptive_actions: Vec<AdaptiveAction>,
    pub snapshot_provenance: SnapshotProvenance,
    pub recording_policy: RecordingPolicy,
    pub determinism: DeterminismContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_handoff: Option<StreamingHandoffPolicy>,
}

impl ResolvedTurnPlan {
    /// §3 invariants, checked once before the plan is handed back to the
    /// caller (beyond the per-field checks the resolver already ran).
    pub fn validate(&self) -> Result<(), String> {
        if self.plan_hash.len() != 64 || !self.plan_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err("plan_hash must be 64 lowercase hex chars".to_string());
        }
        if !self.budgets.is_valid() {
            return Err("budgets must each be >= 1ms".to_string());
        }
        if self.provider_bindings.is_empty() {
            return Err("provider_bindings must be non-empty".to_string());
        }
        if self.edge_buffer_policies.is_empty() {
            return Err("edge_buffer_policies must have at least one entry".to_string());
        }
        if !self.edge_buffer_policies.values().all(EdgeBufferPolicy::is_valid) {
            return Err("every edge buffer policy must have capacity >= 1".to_string());
        }
        if !self.flow_control.is_valid() {
            return Err("flow_control is invalid".to_string());
        }
        if self.snapshot_provenance.first_missing().is_some() {
            return Err("snapshot_provenance is incomplete".to_string());
        }
        if !self.recording_policy.is_valid() {
            return Err("recording_policy.allowed_replay_modes must be non-empty".to_string());
        }
        if !self.determinism.is_valid() {
            return Err("determinism context is invalid".to_string());
        }
        if let Some(ref sh) = self.streaming_handoff {
            if !sh.is_valid() {
                return Err("streaming_handoff policy is invalid".to_string());
            }
        }
        Ok(())
    }
}

pub fn dedup_preserve_order<T: PartialEq + Clone>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(item.clone());
            true
        }
    });
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;

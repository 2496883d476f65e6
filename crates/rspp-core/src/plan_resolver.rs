// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan resolver (C3): freezes an execution profile plus optional
//! policy-surface overrides into an immutable, hash-identified
//! `ResolvedTurnPlan`. Canonicalization is plain sorted-map JSON; any
//! registry/profile ambiguity is resolved in favor of the named profile's
//! fixed defaults, never a silent merge.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::model::{
    AdaptiveAction, DeterminismContext, EdgeBufferPolicy, ExecutionProfile, FlowControlPolicy,
    NodeExecutionPolicy, RecordingPolicy, ResolvedTurnPlan, SnapshotProvenance,
    StreamingHandoffPolicy, TurnBudgets, dedup_preserve_order,
};

/// Registry of named execution profiles an embedding application may extend
/// beyond the built-in MVP `simple` profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ExecutionProfile>,
}

impl ProfileRegistry {
    /// A registry pre-seeded with only the MVP `simple` profile.
    pub fn with_defaults() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("simple".to_string(), ExecutionProfile::simple());
        Self { profiles }
    }

    pub fn register(&mut self, profile: ExecutionProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&ExecutionProfile> {
        self.profiles.get(name)
    }
}

/// Identity fields every plan request must supply, validated verbatim.
#[derive(Debug, Clone)]
pub struct PlanIdentity {
    pub turn_id: String,
    pub pipeline_version: String,
    pub graph_definition_ref: String,
    pub authority_epoch: u64,
}

impl PlanIdentity {
    fn validate(&self) -> Result<(), CoreError> {
        if self.turn_id.is_empty() {
            return Err(CoreError::InvalidIdentity { field: "turn_id".into(), reason: "must be non-empty".into() });
        }
        if self.pipeline_version.is_empty() {
            return Err(CoreError::InvalidIdentity {
                field: "pipeline_version".into(),
                reason: "must be non-empty".into(),
            });
        }
        if self.graph_definition_ref.is_empty() {
            return Err(CoreError::InvalidIdentity {
                field: "graph_definition_ref".into(),
                reason: "must be non-empty".into(),
            });
        }
        Ok(())
    }
}

/// The policy-surface override bundle. Every field must be set if *any*
/// field is set — a partial override is rejected rather than silently
/// merged with profile defaults.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverrides {
    pub budgets: Option<TurnBudgets>,
    pub provider_bindings: Option<BTreeMap<String, String>>,
    pub edge_buffer_policies: Option<BTreeMap<String, EdgeBufferPolicy>>,
    pub node_execution_policies: Option<BTreeMap<String, NodeExecutionPolicy>>,
    pub flow_control: Option<FlowControlPolicy>,
    pub recording_policy: Option<RecordingPolicy>,
}

impl PolicyOverrides {
    fn any_set(&self) -> bool {
        self.budgets.is_some()
            || self.provider_bindings.is_some()
            || self.edge_buffer_policies.is_some()
            || self.node_execution_policies.is_some()
            || self.flow_control.is_some()
            || self.recording_policy.is_some()
    }
}

/// Input to `resolve`.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub identity: PlanIdentity,
    pub execution_profile: String,
    pub snapshot_provenance: SnapshotProvenance,
    pub allowed_adaptive_actions: Vec<AdaptiveAction>,
    pub overrides: PolicyOverrides,
    pub determinism_seed: u64,
    pub ordering_markers: Vec<String>,
    pub merge_rule_id: String,
    pub merge_rule_version: String,
    pub streaming_handoff: Option<StreamingHandoffPolicy>,
    /// Test-only injectable failure: when `true`, resolution fails with
    /// `MaterializationFailed` after all other validation passes.
    pub inject_materialization_failure: bool,
}

fn canonical_string_map(map: &BTreeMap<String, String>) -> String {
    let mut out = String::from("{");
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{k:?}:{v:?}"));
    }
    out.push('}');
    out
}

fn canonical_edge_buffer_policies(map: &BTreeMap<String, EdgeBufferPolicy>) -> String {
    let mut out = String::from("{");
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let fairness = v.fairness_key.as_deref().unwrap_or("");
        out.push_str(&format!(
            "{k:?}:{{capacity:{},fairness_key:{fairness:?},strategy:{:?}}}",
            v.capacity, v.strategy
        ));
    }
    out.push('}');
    out
}

fn canonical_node_execution_policies(map: &BTreeMap<String, NodeExecutionPolicy>) -> String {
    let mut out = String::from("{");
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let fairness = v.fairness_key.as_deref().unwrap_or("");
        out.push_str(&format!(
            "{k:?}:{{concurrency_limit:{},fairness_key:{fairness:?}}}",
            v.concurrency_limit
        ));
    }
    out.push('}');
    out
}

/// Build the canonical byte payload the `planHash` is computed over. Map
/// keys are sorted (`BTreeMap` iteration order), slices are taken as given
/// (callers are expected to have deduplicated them already).
fn canonicalize(
    identity: &PlanIdentity,
    execution_profile: &str,
    budgets: &TurnBudgets,
    provider_bindings: &BTreeMap<String, String>,
    edge_buffer_policies: &BTreeMap<String, EdgeBufferPolicy>,
    node_execution_policies: &BTreeMap<String, NodeExecutionPolicy>,
    allowed_adaptive_actions: &[AdaptiveAction],
    snapshot_provenance: &SnapshotProvenance,
) -> Vec<u8> {
    let actions: Vec<&str> = allowed_adaptive_actions.iter().map(AdaptiveAction::as_str).collect();
    let provenance: Vec<(&str, &str)> = snapshot_provenance.canonical_pairs();
    let payload = format!(
        "turn_id:{:?}|pipeline_version:{:?}|graph_definition_ref:{:?}|authority_epoch:{}|execution_profile:{:?}|budgets:{{turn_ms:{},node_ms:{},path_ms:{},edge_ms:{}}}|provider_bindings:{}|edge_buffer_policies:{}|node_execution_policies:{}|allowed_adaptive_actions:{:?}|snapshot_provenance:{:?}",
        identity.turn_id,
        identity.pipeline_version,
        identity.graph_definition_ref,
        identity.authority_epoch,
        execution_profile,
        budgets.turn_ms,
        budgets.node_ms,
        budgets.path_ms,
        budgets.edge_ms,
        canonical_string_map(provider_bindings),
        canonical_edge_buffer_policies(edge_buffer_policies),
        canonical_node_execution_policies(node_execution_policies),
        actions,
        provenance,
    );
    payload.into_bytes()
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0xf) as usize] as char);
    }
    out
}

/// Resolve a frozen, hash-identified `ResolvedTurnPlan` from `req`,
/// consulting `registry` for the named profile when no override surface is
/// supplied. Identical inputs always yield a byte-identical plan.
pub fn resolve(req: &PlanRequest, registry: &ProfileRegistry) -> Result<ResolvedTurnPlan, CoreError> {
    req.identity.validate()?;

    if let Some(missing) = req.snapshot_provenance.first_missing() {
        return Err(CoreError::IncompleteSnapshotProvenance { missing: missing.to_string() });
    }

    if req.allowed_adaptive_actions.is_empty() {
        return Err(CoreError::InvalidIdentity {
            field: "allowed_adaptive_actions".into(),
            reason: "must be non-empty".into(),
        });
    }
    let mut allowed_adaptive_actions = req.allowed_adaptive_actions.clone();
    dedup_preserve_order(&mut allowed_adaptive_actions);

    let (budgets, provider_bindings, edge_buffer_policies, node_execution_policies, flow_control, recording_policy) =
        if req.overrides.any_set() {
            let (
                Some(budgets),
                Some(provider_bindings),
                Some(edge_buffer_policies),
                Some(node_execution_policies),
                Some(flow_control),
                Some(recording_policy),
            ) = (
                req.overrides.budgets,
                req.overrides.provider_bindings.clone(),
                req.overrides.edge_buffer_policies.clone(),
                req.overrides.node_execution_policies.clone(),
                req.overrides.flow_control.clone(),
                req.overrides.recording_policy.clone(),
            )
            else {
                return Err(CoreError::PartialOverride { surface: "policy".into() });
            };
            if !budgets.is_valid() {
                return Err(CoreError::InvalidIdentity { field: "budgets".into(), reason: "each field must be >= 1ms".into() });
            }
            if provider_bindings.is_empty() {
                return Err(CoreError::InvalidIdentity {
                    field: "provider_bindings".into(),
                    reason: "must be non-empty".into(),
                });
            }
            if edge_buffer_policies.is_empty() || !edge_buffer_policies.values().all(EdgeBufferPolicy::is_valid) {
                return Err(CoreError::InvalidIdentity {
                    field: "edge_buffer_policies".into(),
                    reason: "must be non-empty with capacity >= 1".into(),
                });
            }
            if !flow_control.is_valid() {
                return Err(CoreError::InvalidIdentity { field: "flow_control".into(), reason: "invalid lane policy".into() });
            }
            let mut recording_policy = recording_policy;
            recording_policy.dedup();
            if !recording_policy.is_valid() {
                return Err(CoreError::InvalidIdentity {
                    field: "recording_policy".into(),
                    reason: "allowed_replay_modes must be non-empty".into(),
                });
            }
            (budgets, provider_bindings, edge_buffer_policies, node_execution_policies, flow_control, recording_policy)
        } else {
            let profile = registry
                .get(&req.execution_profile)
                .ok_or_else(|| CoreError::UnsupportedExecutionProfile { profile: req.execution_profile.clone() })?;
            (
                profile.budgets,
                profile.provider_bindings.clone(),
                profile.edge_buffer_policies.clone(),
                profile.node_execution_policies.clone(),
                profile.flow_control.clone(),
                profile.recording_policy.clone(),
            )
        };

    if req.ordering_markers.is_empty() {
        return Err(CoreError::InvalidIdentity {
            field: "ordering_markers".into(),
            reason: "must have at least one entry".into(),
        });
    }
    let determinism = DeterminismContext {
        seed: req.determinism_seed,
        ordering_markers: req.ordering_markers.clone(),
        merge_rule_id: req.merge_rule_id.clone(),
        merge_rule_version: req.merge_rule_version.clone(),
        nondeterministic_inputs: Vec::new(),
    };
    if !determinism.is_valid() {
        return Err(CoreError::InvalidIdentity {
            field: "merge_rule_version".into(),
            reason: "must match v?N.N(.N)?".into(),
        });
    }

    if let Some(ref sh) = req.streaming_handoff {
        if !sh.is_valid() {
            return Err(CoreError::InvalidIdentity {
                field: "streaming_handoff".into(),
                reason: "min_partial_chars/max_pending_revisions must be >= 1".into(),
            });
        }
    }

    if req.inject_materialization_failure {
        return Err(CoreError::MaterializationFailed { reason: "injected by caller".into() });
    }

    let payload = canonicalize(
        &req.identity,
        &req.execution_profile,
        &budgets,
        &provider_bindings,
        &edge_buffer_policies,
        &node_execution_policies,
        &allowed_adaptive_actions,
        &req.snapshot_provenance,
    );
    let plan_hash = hex_encode(&Sha256::digest(&payload));

    let plan = ResolvedTurnPlan {
        turn_id: req.identity.turn_id.clone(),
        pipeline_version: req.identity.pipeline_version.clone(),
        plan_hash,
        graph_definition_ref: req.identity.graph_definition_ref.clone(),
        execution_profile: req.execution_profile.clone(),
        authority_epoch: req.identity.authority_epoch,
        budgets,
        provider_bindings,
        edge_buffer_policies,
        node_execution_policies,
        flow_control,
        allowed_adaptive_actions,
        snapshot_provenance: req.snapshot_provenance.clone(),
        recording_policy,
        determinism,
        streaming_handoff: req.streaming_handoff.clone(),
    };

    plan.validate().map_err(|reason| CoreError::InvalidExecutionPlan { reason })?;
    Ok(plan)
}

#[cfg(test)]
#[path = "plan_resolver_tests.rs"]
mod tests;

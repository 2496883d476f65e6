// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::ids::parse_rfc3339_millis;

/// Short-lived, signed proof carrying an authority epoch and expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementLease {
    pub authority_epoch: u64,
    pub granted: bool,
    pub valid: bool,
    pub token_ref: LeaseTokenRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseTokenRef {
    pub token_id: String,
    pub expires_at_utc: String,
}

impl PlacementLease {
    /// A lease whose `expires_at_utc` is not a well-formed RFC 3339
    /// timestamp, or is in the past relative to `now_ms`, deauthorizes.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match parse_rfc3339_millis(&self.token_ref.expires_at_utc) {
            Some(expires_ms) => expires_ms <= now_ms,
            None => true,
        }
    }
}

/// Transport binding returned by `SessionRouteRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRoute {
    pub tenant_id: String,
    pub session_id: String,
    pub pipeline_version: String,
    pub routing_view_snapshot: String,
    pub admission_policy_snapshot: String,
    pub endpoint: RouteEndpoint,
    pub lease: PlacementLease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEndpoint {
    pub transport_kind: TransportKind,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Transport kinds recognized by the bootstrap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Livekit,
    Websocket,
    Telephony,
}

/// Signed session token returned by `SessionTokenRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedSessionToken {
    pub token: String,
    pub token_id: String,
    pub expires_at_utc: String,
    pub claims: TokenClaims,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub session_id: String,
    pub issued_at_utc: String,
    pub expires_at_utc: String,
}

impl SignedSessionToken {
    /// `issuedAtUTC < expiresAtUTC` per the claims contract.
    pub fn claims_well_ordered(&self) -> bool {
        match (
            parse_rfc3339_millis(&self.claims.issued_at_utc),
            parse_rfc3339_millis(&self.claims.expires_at_utc),
        ) {
            (Some(issued), Some(expires)) => issued < expires,
            _ => false,
        }
    }
}

/// Point-in-time session status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
    Running,
    Degraded,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusView {
    pub status: SessionStatus,
    pub updated_at_utc: String,
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;

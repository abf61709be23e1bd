//! Operator-facing surface for pairing codes and session failures.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{error, info, warn};

use roomservice_core::domain::tenant::TenantId;
use roomservice_core::errors::FailureKind;

pub trait PairingDisplay: Send + Sync {
    /// Replaces any challenge previously shown for the tenant.
    fn show_pairing_challenge(&self, tenant_id: &TenantId, challenge: &str);
    fn clear_pairing_challenge(&self, tenant_id: &TenantId);
    fn report_failure(&self, tenant_id: &TenantId, kind: FailureKind, detail: &str);
}

/// Logs that a challenge exists without printing its payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPairingDisplay;

impl PairingDisplay for LogPairingDisplay {
    fn show_pairing_challenge(&self, tenant_id: &TenantId, challenge: &str) {
        info!(
            event_name = "session.pairing.challenge_issued",
            tenant_id = %tenant_id,
            challenge_len = challenge.len(),
            "pairing challenge issued; scan it from the admin surface"
        );
    }

    fn clear_pairing_challenge(&self, tenant_id: &TenantId) {
        info!(
            event_name = "session.pairing.challenge_cleared",
            tenant_id = %tenant_id,
            "pairing challenge cleared"
        );
    }

    fn report_failure(&self, tenant_id: &TenantId, kind: FailureKind, detail: &str) {
        if kind.requires_reauthorization() {
            error!(
                event_name = "session.operator.reauthorization_required",
                tenant_id = %tenant_id,
                failure = kind.as_str(),
                detail,
                "session needs a fresh pairing scan"
            );
        } else {
            warn!(
                event_name = "session.operator.degraded",
                tenant_id = %tenant_id,
                failure = kind.as_str(),
                detail,
                "session degraded; retries will continue"
            );
        }
    }
}

/// Keeps the latest challenge and the latest failure per tenant so an admin
/// surface can render them. Every update is also logged.
#[derive(Debug, Default)]
pub struct PairingBoard {
    log: LogPairingDisplay,
    challenges: Mutex<HashMap<TenantId, String>>,
    failures: Mutex<HashMap<TenantId, FailureKind>>,
}

impl PairingBoard {
    pub fn current(&self, tenant_id: &TenantId) -> Option<String> {
        let challenges = match self.challenges.lock() {
            Ok(challenges) => challenges,
            Err(poisoned) => poisoned.into_inner(),
        };
        challenges.get(tenant_id).cloned()
    }

    pub fn last_failure(&self, tenant_id: &TenantId) -> Option<FailureKind> {
        let failures = match self.failures.lock() {
            Ok(failures) => failures,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.get(tenant_id).copied()
    }
}

impl PairingDisplay for PairingBoard {
    fn show_pairing_challenge(&self, tenant_id: &TenantId, challenge: &str) {
        self.log.show_pairing_challenge(tenant_id, challenge);
        let mut challenges = match self.challenges.lock() {
            Ok(challenges) => challenges,
            Err(poisoned) => poisoned.into_inner(),
        };
        challenges.insert(tenant_id.clone(), challenge.to_owned());
    }

    fn clear_pairing_challenge(&self, tenant_id: &TenantId) {
        self.log.clear_pairing_challenge(tenant_id);
        let mut challenges = match self.challenges.lock() {
            Ok(challenges) => challenges,
            Err(poisoned) => poisoned.into_inner(),
        };
        challenges.remove(tenant_id);
    }

    fn report_failure(&self, tenant_id: &TenantId, kind: FailureKind, detail: &str) {
        self.log.report_failure(tenant_id, kind, detail);
        let mut failures = match self.failures.lock() {
            Ok(failures) => failures,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.insert(tenant_id.clone(), kind);
    }
}

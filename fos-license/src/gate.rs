//! The module-gating capability handed to every consumer at startup.
//!
//! All queries are fail-closed: before the first validation, after
//! disposal, or while the last result is not usable, nothing is licensed.

use crate::status::{LicenseHolder, LicenseStatus, ValidationResult};
use fos_audit::{events, AuditEvent, AuditSink};
use fos_types::{ErrorKind, TrustFailure, TrustResult};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Lifecycle of a [`LicenseGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateLifecycle {
    Uninitialized,
    Ready,
    Disposed,
}

enum GateState {
    Uninitialized,
    Ready(ValidationResult),
    Disposed,
}

/// Read-only licensing queries over the last validation result.
pub struct LicenseGate {
    state: RwLock<GateState>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Default for LicenseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseGate {
    /// A gate with no audit sink. `authorize_module` decisions are not recorded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GateState::Uninitialized),
            audit: None,
        }
    }

    /// A gate that records `authorize_module` decisions to `audit`.
    #[must_use]
    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: RwLock::new(GateState::Uninitialized),
            audit: Some(audit),
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> GateLifecycle {
        self.read(GateLifecycle::Disposed, |state| match state {
            GateState::Uninitialized => GateLifecycle::Uninitialized,
            GateState::Ready(_) => GateLifecycle::Ready,
            GateState::Disposed => GateLifecycle::Disposed,
        })
    }

    /// Status of the last published result.
    #[must_use]
    pub fn status(&self) -> LicenseStatus {
        self.read(LicenseStatus::Uninitialized, |state| match state {
            GateState::Ready(result) => result.status,
            _ => LicenseStatus::Uninitialized,
        })
    }

    #[must_use]
    pub fn is_module_licensed(&self, module_id: &str) -> bool {
        self.with_usable(false, |r| r.allowed_modules.contains(module_id))
    }

    #[must_use]
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.with_usable(false, |r| r.allowed_features.contains(feature))
    }

    #[must_use]
    pub fn current_tier(&self) -> Option<String> {
        self.with_usable(None, |r| r.tier.clone())
    }

    /// License id and client code of the grant currently in force.
    #[must_use]
    pub fn holder(&self) -> Option<LicenseHolder> {
        self.with_usable(None, |r| r.holder.clone())
    }

    /// Like [`is_module_licensed`](Self::is_module_licensed), but records the
    /// decision in the audit log.
    ///
    /// # Errors
    ///
    /// `ModuleNotLicensed` when access is denied.
    pub fn authorize_module(&self, module_id: &str) -> TrustResult<()> {
        let allowed = self.is_module_licensed(module_id);
        let status = self.status();

        if let Some(audit) = &self.audit {
            audit.record(
                AuditEvent::new(
                    events::ACCESS_DECISION,
                    if allowed {
                        "module access granted"
                    } else {
                        "module access denied"
                    },
                    allowed,
                )
                .with_detail("moduleId", module_id)
                .with_detail("status", status.as_str()),
            );
        }

        if allowed {
            debug!(module_id, "Module access granted");
            Ok(())
        } else {
            debug!(module_id, %status, "Module access denied");
            Err(
                TrustFailure::new(ErrorKind::ModuleNotLicensed, "module is not licensed")
                    .with_detail("moduleId", module_id)
                    .with_detail("status", status.as_str()),
            )
        }
    }

    /// Permanently closes the gate. Later publications are ignored.
    pub fn dispose(&self) {
        match self.state.write() {
            Ok(mut state) => *state = GateState::Disposed,
            Err(poisoned) => *poisoned.into_inner() = GateState::Disposed,
        }
    }

    pub(crate) fn publish(&self, result: ValidationResult) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(*state, GateState::Disposed) {
            warn!("Ignoring validation result published to disposed gate");
            return;
        }
        *state = GateState::Ready(result);
    }

    fn read<T>(&self, fallback: T, f: impl FnOnce(&GateState) -> T) -> T {
        match self.state.read() {
            Ok(state) => f(&state),
            Err(_) => fallback,
        }
    }

    fn with_usable<T>(&self, fallback: T, f: impl FnOnce(&ValidationResult) -> T) -> T {
        match self.state.read() {
            Ok(state) => match &*state {
                GateState::Ready(result) if result.is_usable() => f(result),
                _ => fallback,
            },
            Err(_) => fallback,
        }
    }
}

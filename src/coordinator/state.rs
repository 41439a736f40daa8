//! Lifecycle state machine (spec.md §5).

use crate::model::LicenseStatusType;

/// Why an `Invalid` state was entered. `Revoked` and `ClockTamper` are
/// terminal for the rest of the process's life — only `reset()` clears
/// them, same as `ClockMonitor::clear_tamper` is only ever called there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Revoked,
    ClockTamper,
    Expired,
    Other,
}

impl InvalidReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvalidReason::Revoked | InvalidReason::ClockTamper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    Uninitialized,
    NoLicense,
    Validating,
    Active,
    ActivationFailed,
    OfflineActive,
    Invalid(InvalidReason),
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Invalid(r) if r.is_terminal())
    }

    pub fn to_status_type(&self) -> LicenseStatusType {
        match self {
            CoordinatorState::Uninitialized | CoordinatorState::NoLicense => LicenseStatusType::Inactive,
            CoordinatorState::Validating | CoordinatorState::ActivationFailed => LicenseStatusType::Pending,
            CoordinatorState::Active => LicenseStatusType::Active,
            CoordinatorState::OfflineActive => LicenseStatusType::OfflineValid,
            CoordinatorState::Invalid(_) => LicenseStatusType::Invalid,
        }
    }

    /// Whether a license is considered "valid" for entitlement purposes in
    /// this state (spec.md §4.7's license-valid predicate extended to the
    /// full state machine, not just `License::is_valid`).
    pub fn license_is_usable(&self) -> bool {
        matches!(self, CoordinatorState::Active | CoordinatorState::OfflineActive)
    }

    /// Legal transitions, per spec.md §5. Used defensively in debug builds
    /// and by tests; the coordinator itself only ever constructs states
    /// through these paths, but asserting it here catches a future bug
    /// where a new code path tries to skip a step.
    pub fn can_transition_to(&self, next: &CoordinatorState) -> bool {
        use CoordinatorState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Uninitialized, NoLicense) => true,
            (Uninitialized, Validating) => true,
            (NoLicense, Validating) => true,
            (Validating, Active) => true,
            (Validating, ActivationFailed) => true,
            (Validating, Invalid(_)) => true,
            (Validating, OfflineActive) => true,
            (ActivationFailed, Validating) => true,
            (ActivationFailed, NoLicense) => true,
            (Active, OfflineActive) => true,
            (Active, Invalid(_)) => true,
            (Active, Validating) => true,
            (Active, NoLicense) => true,
            (OfflineActive, Active) => true,
            (OfflineActive, Invalid(_)) => true,
            (OfflineActive, Validating) => true,
            (OfflineActive, NoLicense) => true,
            (Invalid(r), NoLicense) if !r.is_terminal() => true,
            (Invalid(r), Validating) if !r.is_terminal() => true,
            _ => false,
        }
    }
}

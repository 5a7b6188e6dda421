//! Booking saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a booking saga.
///
/// State transitions:
/// ```text
/// Started ──► Locked ──► Priced ──► LedgerPending ──► SlotFinalized ──► Confirmed
///    │           │          │            │                 │
///    └───────────┴──────────┴────────────┴─────────────────┴──► Compensating ──► Failed
/// ```
/// A failure before any resource is held goes straight to `Failed` through
/// an empty compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    /// Request accepted, nothing acquired yet.
    #[default]
    Started,

    /// Slot lock held.
    Locked,

    /// Every requested service resolved to a price snapshot.
    Priced,

    /// `PENDING` booking committed to the ledger.
    LedgerPending,

    /// Slot marked booked by this booking.
    SlotFinalized,

    /// Booking confirmed (terminal state).
    Confirmed,

    /// A step failed and acquired resources are being undone.
    Compensating,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Returns the forward successor on the success path.
    pub fn next(&self) -> Option<SagaState> {
        match self {
            SagaState::Started => Some(SagaState::Locked),
            SagaState::Locked => Some(SagaState::Priced),
            SagaState::Priced => Some(SagaState::LedgerPending),
            SagaState::LedgerPending => Some(SagaState::SlotFinalized),
            SagaState::SlotFinalized => Some(SagaState::Confirmed),
            SagaState::Confirmed | SagaState::Compensating | SagaState::Failed => None,
        }
    }

    /// Returns true if a failure in this state triggers compensation.
    pub fn can_compensate(&self) -> bool {
        !self.is_terminal() && *self != SagaState::Compensating
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Confirmed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Started => "STARTED",
            SagaState::Locked => "LOCKED",
            SagaState::Priced => "PRICED",
            SagaState::LedgerPending => "LEDGER_PENDING",
            SagaState::SlotFinalized => "SLOT_FINALIZED",
            SagaState::Confirmed => "CONFIRMED",
            SagaState::Compensating => "COMPENSATING",
            SagaState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

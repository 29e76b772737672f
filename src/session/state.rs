//! Session lifecycle state machine.

/// Lifecycle phase of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Admission in progress; no loops running yet.
    #[default]
    Admitting,
    /// Read and dispatch loops running; deadline armed.
    Active,
    /// Shutdown triggered; farewell and connection close in progress.
    Closing,
    /// Registry entry removed, resources released. Terminal.
    Terminated,
}

impl SessionPhase {
    /// Check if transition to target phase is valid.
    ///
    /// Valid transitions:
    /// - Admitting -> Active
    /// - Active -> Closing (deadline, sentinel, read/write failure, non-text)
    /// - Active -> Active (reattachment replaces the connection)
    /// - Closing -> Active (reattachment won the race against teardown)
    /// - Closing -> Terminated
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (*self, target),
            (Admitting, Active)
                | (Active, Closing)
                | (Active, Active)
                | (Closing, Active)
                | (Closing, Terminated)
        )
    }

    /// Attempt to transition to a new phase.
    pub fn transition_to(&mut self, target: SessionPhase) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::RelayError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Terminated)
    }

    /// Check if the session can process client messages.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active)
    }
}

use std::fmt;

use clinbridge_core::{ResourceType, Result};
use tracing::{debug, warn};

use crate::handler::Interaction;

/// Stages an interaction passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Received,
    /// Request translated into native form.
    Mapped,
    /// Repository call completed.
    Executed,
    /// Results translated back into external form.
    MappedBack,
    Responded,
    Faulted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Mapped => "mapped",
            Self::Executed => "executed",
            Self::MappedBack => "mapped_back",
            Self::Responded => "responded",
            Self::Faulted => "faulted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Responded | Self::Faulted)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of one interaction.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    interaction: Interaction,
    kind: ResourceType,
    states: Vec<LifecycleState>,
}

impl Lifecycle {
    pub fn new(interaction: Interaction, kind: ResourceType) -> Self {
        Self {
            interaction,
            kind,
            states: vec![LifecycleState::Received],
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.states
            .last()
            .copied()
            .unwrap_or(LifecycleState::Received)
    }

    /// Every state visited so far, in order.
    pub fn states(&self) -> &[LifecycleState] {
        &self.states
    }

    pub fn advance(&mut self, next: LifecycleState) {
        if self.state().is_terminal() {
            return;
        }
        debug!(
            interaction = %self.interaction,
            resource_type = %self.kind,
            from = %self.state(),
            state = %next,
            "Lifecycle transition"
        );
        self.states.push(next);
    }

    /// Close the lifecycle with the interaction's result.
    ///
    /// Faults are logged and handed back unchanged.
    pub fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.advance(LifecycleState::Responded),
            Err(err) => {
                warn!(
                    interaction = %self.interaction,
                    resource_type = %self.kind,
                    at = %self.state(),
                    error_kind = %err.kind(),
                    diagnostics = %err.diagnostics(),
                    "Interaction faulted"
                );
                self.advance(LifecycleState::Faulted);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinbridge_core::FhirError;

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new(Interaction::Create, ResourceType::Patient);
        lifecycle.advance(LifecycleState::Mapped);
        lifecycle.advance(LifecycleState::Executed);
        lifecycle.advance(LifecycleState::MappedBack);
        assert!(lifecycle.finish(Ok(())).is_ok());
        assert_eq!(
            lifecycle.states(),
            &[
                LifecycleState::Received,
                LifecycleState::Mapped,
                LifecycleState::Executed,
                LifecycleState::MappedBack,
                LifecycleState::Responded,
            ]
        );
    }

    #[test]
    fn test_fault_is_terminal_and_reraised() {
        let mut lifecycle = Lifecycle::new(Interaction::Read, ResourceType::Patient);
        lifecycle.advance(LifecycleState::Mapped);
        let result: Result<()> = lifecycle.finish(Err(FhirError::not_found("Patient", "x")));
        assert!(result.is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Faulted);

        lifecycle.advance(LifecycleState::Executed);
        assert_eq!(lifecycle.state(), LifecycleState::Faulted);
    }
}

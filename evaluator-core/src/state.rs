// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-instance-type iteration state machine with typed state transitions.
//!
//! Acquiring → AwaitingReady → ResolvingAddress → AwaitingHealthy →
//! Benchmarking → ComputingCost → Released(Success)
//!
//! Any non-terminal state may jump to Released(Failure). Invalid transitions
//! result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::InstanceType;

/// How an iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Success,
    Failure,
}

/// Iteration lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationState {
    /// Requesting an instance from the provider.
    Acquiring,

    /// Instance created; waiting for the provider to report it running.
    AwaitingReady,

    /// Fetching the public address of the ready instance.
    ResolvingAddress,

    /// Polling the service health endpoint.
    AwaitingHealthy,

    /// Issuing timed inference requests.
    Benchmarking,

    /// Turning measured latency into cost per inference.
    ComputingCost,

    /// Terminal: the instance (if any) has been handed back.
    Released(Completion),
}

impl IterationState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Acquiring => "Acquiring",
            Self::AwaitingReady => "AwaitingReady",
            Self::ResolvingAddress => "ResolvingAddress",
            Self::AwaitingHealthy => "AwaitingHealthy",
            Self::Benchmarking => "Benchmarking",
            Self::ComputingCost => "ComputingCost",
            Self::Released(Completion::Success) => "Released(Success)",
            Self::Released(Completion::Failure) => "Released(Failure)",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Released(_))
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: IterationState) -> bool {
        matches!(
            (self, target),
            (Self::Acquiring, Self::AwaitingReady)
                | (Self::AwaitingReady, Self::ResolvingAddress)
                | (Self::ResolvingAddress, Self::AwaitingHealthy)
                | (Self::AwaitingHealthy, Self::Benchmarking)
                | (Self::Benchmarking, Self::ComputingCost)
                | (Self::ComputingCost, Self::Released(Completion::Success))
                | (
                    Self::Acquiring
                        | Self::AwaitingReady
                        | Self::ResolvingAddress
                        | Self::AwaitingHealthy
                        | Self::Benchmarking
                        | Self::ComputingCost,
                    Self::Released(Completion::Failure)
                )
        )
    }
}

impl std::fmt::Display for IterationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one instance type's benchmark iteration.
#[derive(Debug)]
pub struct IterationStateMachine {
    instance_type: InstanceType,
    current_state: IterationState,
    started: Instant,
    last_transition: Instant,
    transition_count: u64,
}

impl IterationStateMachine {
    pub fn new(instance_type: InstanceType) -> Self {
        let now = Instant::now();
        Self {
            instance_type,
            current_state: IterationState::Acquiring,
            started: now,
            last_transition: now,
            transition_count: 0,
        }
    }

    pub fn state(&self) -> IterationState {
        self.current_state
    }

    pub fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }

    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    /// Wall-clock time since the iteration started.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: IterationState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                instance_type: self.instance_type.clone(),
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                instance_type: self.instance_type.clone(),
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            instance_type = %self.instance_type,
            from = self.current_state.name(),
            to = target.name(),
            elapsed_ms = self.time_in_current_state().as_millis() as u64,
            "State transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Move to Released(Failure) from whatever non-terminal state we are in.
    /// Returns the state the failure happened in.
    pub fn fail(&mut self) -> Result<IterationState, StateTransitionError> {
        let failed_in = self.current_state;
        self.transition_to(IterationState::Released(Completion::Failure))?;
        Ok(failed_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_machine() -> IterationStateMachine {
        IterationStateMachine::new(InstanceType::new("t3.medium").unwrap())
    }

    #[test]
    fn test_initial_state() {
        let sm = make_machine();
        assert_eq!(sm.state(), IterationState::Acquiring);
        assert_eq!(sm.transition_count(), 0);
    }

    #[test]
    fn test_happy_path() {
        let mut sm = make_machine();
        for target in [
            IterationState::AwaitingReady,
            IterationState::ResolvingAddress,
            IterationState::AwaitingHealthy,
            IterationState::Benchmarking,
            IterationState::ComputingCost,
            IterationState::Released(Completion::Success),
        ] {
            sm.transition_to(target).unwrap();
            assert_eq!(sm.state(), target);
        }
        assert_eq!(sm.transition_count(), 6);
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_no_skipping_stages() {
        let mut sm = make_machine();
        assert!(sm.transition_to(IterationState::Benchmarking).is_err());
        assert!(sm
            .transition_to(IterationState::Released(Completion::Success))
            .is_err());
        assert_eq!(sm.state(), IterationState::Acquiring);
    }

    #[test]
    fn test_fail_from_any_stage() {
        let mut sm = make_machine();
        sm.transition_to(IterationState::AwaitingReady).unwrap();
        sm.transition_to(IterationState::ResolvingAddress).unwrap();

        let failed_in = sm.fail().unwrap();
        assert_eq!(failed_in, IterationState::ResolvingAddress);
        assert_eq!(sm.state(), IterationState::Released(Completion::Failure));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut sm = make_machine();
        sm.fail().unwrap();
        assert!(matches!(
            sm.transition_to(IterationState::AwaitingReady),
            Err(StateTransitionError::TerminalState { .. })
        ));
        assert!(sm.fail().is_err());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(IterationState::AwaitingHealthy.to_string(), "AwaitingHealthy");
        assert_eq!(
            IterationState::Released(Completion::Failure).name(),
            "Released(Failure)"
        );
    }
}

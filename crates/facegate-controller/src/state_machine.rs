//! Lock state machine.
//!
//! Two states and five triggers:
//!
//! | Trigger | From | To |
//! |---------|------|----|
//! | `Confirmed(name)` | CLOSED | OPEN |
//! | `ManualOpen` | CLOSED | OPEN |
//! | `ManualClose` | OPEN | CLOSED |
//! | `DwellExpired` | OPEN | CLOSED |
//! | `AbsenceTimeout` | OPEN | CLOSED |
//!
//! A trigger whose target is the current state is rejected. The machine is
//! plain data with no I/O; the controller task evaluates a trigger, drives
//! the actuator, and then commits the transition.
//!
//! # Examples
//!
//! ```
//! use facegate_controller::{LockStateMachine, LockTrigger};
//! use facegate_core::LockState;
//!
//! let mut machine = LockStateMachine::new();
//! let target = machine.evaluate(&LockTrigger::ManualOpen).unwrap();
//! assert_eq!(target, LockState::Open);
//!
//! machine.commit(LockTrigger::ManualOpen, true);
//! assert!(machine.evaluate(&LockTrigger::ManualOpen).is_err());
//! assert_eq!(machine.history().len(), 1);
//! ```

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use facegate_core::LockState;
use facegate_core::constants::MAX_TRANSITION_HISTORY;
use serde::Serialize;

use crate::error::{ControllerError, Result};

/// An event asking the lock to change state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LockTrigger {
    /// The recognizer confirmed an enrolled identity.
    Confirmed(String),

    /// Operator asked to open.
    ManualOpen,

    /// Operator asked to close.
    ManualClose,

    /// The dwell period after an unlock ran out.
    DwellExpired,

    /// Nobody has been in view for the absence threshold.
    AbsenceTimeout,
}

impl LockTrigger {
    /// State this trigger moves the lock to.
    pub fn target(&self) -> LockState {
        match self {
            Self::Confirmed(_) | Self::ManualOpen => LockState::Open,
            Self::ManualClose | Self::DwellExpired | Self::AbsenceTimeout => LockState::Closed,
        }
    }

    /// Identity name for confirmed unlocks.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Confirmed(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for LockTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(name) => write!(f, "confirmed({name})"),
            Self::ManualOpen => write!(f, "manual open"),
            Self::ManualClose => write!(f, "manual close"),
            Self::DwellExpired => write!(f, "dwell expired"),
            Self::AbsenceTimeout => write!(f, "absence timeout"),
        }
    }
}

/// Record of an applied transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockTransition {
    pub from: LockState,
    pub to: LockState,
    pub trigger: LockTrigger,

    /// Whether the actuator accepted the command for this transition.
    pub command_delivered: bool,

    /// When the transition was applied.
    pub at: DateTime<Utc>,
}

impl fmt::Display for LockTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({})",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.from,
            self.to,
            self.trigger
        )?;
        if !self.command_delivered {
            write!(f, " [actuator not reached]")?;
        }
        Ok(())
    }
}

/// Lock state plus a bounded history of applied transitions.
#[derive(Debug, Clone, Default)]
pub struct LockStateMachine {
    state: LockState,
    history: VecDeque<LockTransition>,
}

impl LockStateMachine {
    /// Create a machine in the CLOSED state.
    pub fn new() -> Self {
        Self {
            state: LockState::Closed,
            history: VecDeque::with_capacity(MAX_TRANSITION_HISTORY),
        }
    }

    /// Current state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Check `trigger` against the current state without applying it.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyOpen`] or [`ControllerError::AlreadyClosed`]
    /// when the lock is already where the trigger would move it.
    pub fn evaluate(&self, trigger: &LockTrigger) -> Result<LockState> {
        let target = trigger.target();
        if target == self.state {
            return Err(match target {
                LockState::Open => ControllerError::AlreadyOpen,
                LockState::Closed => ControllerError::AlreadyClosed,
            });
        }
        Ok(target)
    }

    /// Move to the trigger's target state and record the transition.
    ///
    /// Callers evaluate first; committing a redundant trigger records a
    /// transition that leaves the state unchanged.
    pub fn commit(&mut self, trigger: LockTrigger, command_delivered: bool) -> LockTransition {
        let transition = LockTransition {
            from: self.state,
            to: trigger.target(),
            trigger,
            command_delivered,
            at: Utc::now(),
        };
        self.state = transition.to;
        self.add_to_history(transition.clone());
        transition
    }

    /// Applied transitions, oldest first.
    pub fn history(&self) -> &VecDeque<LockTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<LockTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    fn add_to_history(&mut self, transition: LockTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_TRANSITION_HISTORY {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_machine_is_closed() {
        let machine = LockStateMachine::new();
        assert_eq!(machine.state(), LockState::Closed);
        assert!(machine.history().is_empty());
    }

    #[rstest]
    #[case(LockState::Closed, LockTrigger::Confirmed("alice".into()), Ok(LockState::Open))]
    #[case(LockState::Closed, LockTrigger::ManualOpen, Ok(LockState::Open))]
    #[case(LockState::Closed, LockTrigger::ManualClose, Err(ControllerError::AlreadyClosed))]
    #[case(LockState::Closed, LockTrigger::DwellExpired, Err(ControllerError::AlreadyClosed))]
    #[case(LockState::Closed, LockTrigger::AbsenceTimeout, Err(ControllerError::AlreadyClosed))]
    #[case(LockState::Open, LockTrigger::Confirmed("alice".into()), Err(ControllerError::AlreadyOpen))]
    #[case(LockState::Open, LockTrigger::ManualOpen, Err(ControllerError::AlreadyOpen))]
    #[case(LockState::Open, LockTrigger::ManualClose, Ok(LockState::Closed))]
    #[case(LockState::Open, LockTrigger::DwellExpired, Ok(LockState::Closed))]
    #[case(LockState::Open, LockTrigger::AbsenceTimeout, Ok(LockState::Closed))]
    fn test_transition_table(
        #[case] from: LockState,
        #[case] trigger: LockTrigger,
        #[case] expected: Result<LockState>,
    ) {
        let mut machine = LockStateMachine::new();
        if from == LockState::Open {
            machine.commit(LockTrigger::ManualOpen, true);
        }
        assert_eq!(machine.evaluate(&trigger), expected);
    }

    #[test]
    fn test_commit_records_transition() {
        let mut machine = LockStateMachine::new();

        let transition = machine.commit(LockTrigger::Confirmed("alice".into()), false);

        assert_eq!(transition.from, LockState::Closed);
        assert_eq!(transition.to, LockState::Open);
        assert!(!transition.command_delivered);
        assert_eq!(transition.trigger.identity(), Some("alice"));
        assert_eq!(machine.state(), LockState::Open);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = LockStateMachine::new();
        for _ in 0..(MAX_TRANSITION_HISTORY + 10) {
            machine.commit(LockTrigger::ManualOpen, true);
            machine.commit(LockTrigger::ManualClose, true);
        }
        assert_eq!(machine.history().len(), MAX_TRANSITION_HISTORY);
    }

    #[test]
    fn test_last_transitions() {
        let mut machine = LockStateMachine::new();
        machine.commit(LockTrigger::ManualOpen, true);
        machine.commit(LockTrigger::DwellExpired, true);
        machine.commit(LockTrigger::Confirmed("bob".into()), true);

        let last = machine.last_transitions(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].trigger, LockTrigger::DwellExpired);
        assert_eq!(last[1].trigger, LockTrigger::Confirmed("bob".into()));
        assert_eq!(machine.last_transitions(10).len(), 3);
    }

    #[test]
    fn test_transition_display() {
        let mut machine = LockStateMachine::new();
        let transition = machine.commit(LockTrigger::Confirmed("alice".into()), false);
        let text = transition.to_string();
        assert!(text.ends_with("CLOSED -> OPEN (confirmed(alice)) [actuator not reached]"));
    }
}

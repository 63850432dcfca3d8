//! Lifecycle state machine.
//!
//! Two values are tracked. The *requested* state is updated synchronously by
//! [`StateMachine::request`] and is what callers observe through
//! [`StateMachine::state`]. The *applied* state only moves when the engine
//! loop confirms a dispatched transition, and observers are notified exactly
//! when it changes.
//!
//! ```text
//! current        command   next        dispatch
//! Uninitialized  Suspend   Suspended   no
//! Uninitialized  Resume    Resumed     no
//! Suspended      Resume    Resumed     yes
//! Resumed        Suspend   Suspended   yes
//! Suspended      Suspend   IllegalState
//! Resumed        Resume    IllegalState
//! ```

use webhost_types::{Command, LifecycleState, WebhostError};

/// Outcome of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: LifecycleState,
    /// Whether the engine must apply the new state.
    pub dispatch: bool,
}

/// Look up `command` in the transition table.
///
/// # Errors
///
/// [`WebhostError::IllegalState`] when the command would re-enter the
/// current state.
pub fn transition(current: LifecycleState, command: Command) -> Result<Transition, WebhostError> {
    use LifecycleState::*;

    match (current, command) {
        (Uninitialized, _) => Ok(Transition {
            next: command.target(),
            dispatch: false,
        }),
        (Suspended, Command::Resume) | (Resumed, Command::Suspend) => Ok(Transition {
            next: command.target(),
            dispatch: true,
        }),
        (Suspended, Command::Suspend) | (Resumed, Command::Resume) => {
            Err(WebhostError::IllegalState {
                state: current,
                command,
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct StateMachine {
    requested: LifecycleState,
    applied: LifecycleState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The synchronously requested state. May be ahead of [`applied`](Self::applied).
    pub fn state(&self) -> LifecycleState {
        self.requested
    }

    /// The last state the engine confirmed.
    pub fn applied(&self) -> LifecycleState {
        self.applied
    }

    /// Validate `command` and record the new requested state.
    ///
    /// On error the stored state is left untouched.
    pub fn request(&mut self, command: Command) -> Result<Transition, WebhostError> {
        let t = transition(self.requested, command)?;
        self.requested = t.next;
        Ok(t)
    }

    /// Prepare for a freshly started engine loop and return the state it
    /// must be driven into. Anything but `Resumed` starts suspended.
    pub fn begin(&mut self) -> LifecycleState {
        self.requested = match self.requested {
            LifecycleState::Resumed => LifecycleState::Resumed,
            _ => LifecycleState::Suspended,
        };
        self.applied = LifecycleState::Uninitialized;
        self.requested
    }

    /// Record that the engine applied `state`. Returns `true` if this
    /// changed the applied state, i.e. observers must be told.
    pub fn confirm(&mut self, state: LifecycleState) -> bool {
        if self.applied == state {
            return false;
        }
        self.applied = state;
        true
    }
}

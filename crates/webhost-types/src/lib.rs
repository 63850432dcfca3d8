use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of the single browser instance owned by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No engine has confirmed a state yet.
    #[default]
    Uninitialized,
    /// The view is detached from the window; the engine throttles itself.
    Suspended,
    /// The view is attached to the window and renders normally.
    Resumed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Suspended => write!(f, "suspended"),
            LifecycleState::Resumed => write!(f, "resumed"),
        }
    }
}

/// The only two transitions a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Suspend,
    Resume,
}

impl Command {
    /// The state this command moves towards.
    pub fn target(self) -> LifecycleState {
        match self {
            Command::Suspend => LifecycleState::Suspended,
            Command::Resume => LifecycleState::Resumed,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Suspend => write!(f, "suspend"),
            Command::Resume => write!(f, "resume"),
        }
    }
}

/// Window flags applied to the engine view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewState {
    pub visible: bool,
    pub in_window: bool,
}

impl ViewState {
    /// Flags for the given lifecycle state and hidden flag. Only a resumed
    /// view sits in the window; only a non-hidden view is visible.
    pub fn new(state: LifecycleState, hidden: bool) -> Self {
        Self {
            visible: !hidden,
            in_window: state == LifecycleState::Resumed,
        }
    }
}

/// One process of the monitored tree, sampled fresh on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Parent pid, when the platform exposes it.
    pub parent: Option<u32>,
    pub name: String,
    /// Resident set size in bytes.
    pub resident: u64,
    /// Virtual (allocated) size in bytes.
    pub allocated: u64,
    /// Shared (file-backed + shmem) resident bytes.
    pub shared: u64,
    /// `false` for zombie or dead entries.
    pub active: bool,
}

/// Envelope published on the hub's broadcast stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "webhost-runtime::engine"
    pub source: String,
    pub payload: EventPayload,
}

impl BrowserEvent {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Everything an observer can be told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EventPayload {
    StateChanged(LifecycleState),
    UrlChanged(String),
    LoadFinished(String),
    Hidden(bool),
    ClosureRequested,
}

/// Error type for the supervisor control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhostError {
    #[error("Illegal state: cannot {command} while {state}")]
    IllegalState {
        state: LifecycleState,
        command: Command,
    },

    #[error("Observer is already registered")]
    ObserverAlreadyRegistered,

    #[error("Observer is not registered")]
    ObserverNotRegistered,

    #[error("Engine loop error: {0}")]
    EngineLoop(String),

    #[error("Engine loop did not stop within {0:?}")]
    TeardownTimeout(Duration),

    #[error("Too many mandatory processes: {0} (at most 32 are supported)")]
    TooManyMandatoryProcesses(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

//! [`BrowserSupervisor`] – the control surface of one browser instance.
//!
//! Callers on any thread drive the lifecycle through this type. One coarse
//! lock guards the lifecycle state, tracked URL, hidden flag, frame counter
//! and dispatcher handle. Engine-visible effects are queued on the engine
//! loop while that lock is held, so the loop applies them in the same order
//! the state machine accepted them. Observer callbacks always run after the
//! lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use webhost_middleware::{LifecycleObserver, NotificationHub, StateObserver};
use webhost_types::{BrowserEvent, Command, LifecycleState, ViewState, WebhostError};

use crate::dispatcher::Dispatcher;
use crate::engine::{Engine, EngineEvents, EngineFactory};
use crate::engine_loop::EngineLoop;
use crate::frame_rate::FrameCounter;
use crate::state_machine::StateMachine;

/// Broadcast buffer size for the supervisor's event stream.
const EVENT_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Typed start-up settings handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserConfig {
    /// Initial URL, loaded as soon as the engine loop starts.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
    pub max_fps: u32,
    /// Feed displayed frames into the frame-rate sampler.
    pub fps_sampling: bool,
    pub page_group: String,
    pub user_agent: Option<String>,
    pub cookie_storage: Option<String>,
    pub local_storage: Option<String>,
    pub languages: Vec<String>,
    pub certificate_check: bool,
    pub transparent: bool,
    /// Persistence root, passed through to the engine untouched.
    pub data_path: String,
    /// Upper bound on how long teardown waits for the engine loop.
    pub teardown_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            url: "http://www.google.com".to_string(),
            width: 1280,
            height: 720,
            scale_factor: 1.0,
            max_fps: 60,
            fps_sampling: false,
            page_group: "WPEPageGroup".to_string(),
            user_agent: None,
            cookie_storage: None,
            local_storage: None,
            languages: Vec::new(),
            certificate_check: true,
            transparent: false,
            data_path: String::new(),
            teardown_timeout: Duration::from_millis(6000),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

struct Inner {
    machine: StateMachine,
    url: String,
    hidden: bool,
    frames: FrameCounter,
    /// `Some` while an engine loop is running.
    dispatcher: Option<Dispatcher>,
}

/// State reachable from both caller threads and the engine loop.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    hub: NotificationHub,
    fps_sampling: bool,
}

impl Shared {
    pub(crate) fn new(config: &BrowserConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                machine: StateMachine::new(),
                url: config.url.clone(),
                hidden: false,
                frames: FrameCounter::new(),
                dispatcher: None,
            }),
            hub: NotificationHub::new(EVENT_CAPACITY),
            fps_sampling: config.fps_sampling,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the engine-visible half of a transition to `target`.
    fn dispatch_state(self: &Arc<Self>, dispatcher: &Dispatcher, target: LifecycleState) {
        let shared = Arc::clone(self);
        let queued = Instant::now();
        dispatcher.submit(move |engine| {
            let hidden = shared.lock().hidden;
            engine.set_view_state(ViewState::new(target, hidden));
            debug!(
                state = %target,
                latency_us = queued.elapsed().as_micros() as u64,
                "engine applied lifecycle state"
            );
            shared.confirm_state(target);
        });
    }

    /// Queue a visibility change that leaves the lifecycle state alone.
    fn dispatch_hidden(self: &Arc<Self>, dispatcher: &Dispatcher, hidden: bool) {
        let shared = Arc::clone(self);
        dispatcher.submit(move |engine| {
            let applied = shared.lock().machine.applied();
            engine.set_view_state(ViewState::new(applied, hidden));
            debug!(hidden, "engine applied visibility");
            shared.hub.notify_hidden(hidden);
        });
    }

    fn confirm_state(&self, state: LifecycleState) {
        let changed = self.lock().machine.confirm(state);
        if changed {
            self.hub.notify_state_change(state);
        }
    }

    pub(crate) fn url_changed(&self, url: &str) {
        self.lock().url = url.to_string();
        self.hub.notify_url_changed(url);
    }

    pub(crate) fn load_finished(&self, url: &str) {
        self.lock().url = url.to_string();
        self.hub.notify_load_finished(url);
    }

    pub(crate) fn closure_requested(&self) {
        info!("page requested window closure");
        self.hub.notify_closure_requested();
    }

    pub(crate) fn frame_displayed(&self) {
        if !self.fps_sampling {
            return;
        }
        if let Some(fps) = self.lock().frames.frame(Instant::now()) {
            trace!(fps, "frame rate sample");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BrowserSupervisor
// ─────────────────────────────────────────────────────────────────────────────

/// Owns one browser instance and its engine loop.
///
/// Dropping the supervisor tears the engine loop down.
pub struct BrowserSupervisor {
    config: BrowserConfig,
    shared: Arc<Shared>,
    engine_loop: Mutex<Option<EngineLoop>>,
}

impl BrowserSupervisor {
    pub fn new(config: BrowserConfig) -> Self {
        let shared = Arc::new(Shared::new(&config));
        Self {
            config,
            shared,
            engine_loop: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    // ── Engine loop ──────────────────────────────────────────────────────────

    /// Start the engine loop, load the tracked URL and drive the engine into
    /// the stored state (suspended unless a resume was already requested).
    ///
    /// # Errors
    ///
    /// [`WebhostError::EngineLoop`] if a loop is already running, the thread
    /// cannot be spawned or the factory fails.
    pub fn start(&self, factory: EngineFactory) -> Result<(), WebhostError> {
        let mut slot = self.engine_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(WebhostError::EngineLoop(
                "engine loop is already running".to_string(),
            ));
        }

        let mut config = self.config.clone();
        config.url = self.url();
        let events = EngineEvents::new(Arc::clone(&self.shared));
        let engine_loop = EngineLoop::spawn(factory, config, events)?;
        let dispatcher = engine_loop.dispatcher().clone();

        {
            let mut inner = self.shared.lock();
            let target = inner.machine.begin();
            inner.frames.reset();
            let url = inner.url.clone();
            dispatcher.submit(move |engine| engine.load_url(&url));
            self.shared.dispatch_state(&dispatcher, target);
            info!(state = %target, url = %inner.url, "engine loop running");
            inner.dispatcher = Some(dispatcher);
        }

        *slot = Some(engine_loop);
        Ok(())
    }

    /// Stop the engine loop, waiting at most the configured teardown timeout.
    ///
    /// A loop that does not stop in time is logged and abandoned; teardown
    /// still completes. Dispatches made afterwards are dropped.
    pub fn shutdown(&self) {
        let Some(engine_loop) = self
            .engine_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        {
            let mut inner = self.shared.lock();
            inner.dispatcher = None;
            inner.frames.reset();
        }

        match engine_loop.shutdown(self.config.teardown_timeout) {
            Ok(()) => info!("engine loop shut down"),
            Err(e) => warn!(error = %e, "engine loop teardown timed out, proceeding"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().dispatcher.is_some()
    }

    /// Run `task` on the engine loop. Returns `false` (and drops the task)
    /// when no loop is running.
    pub fn dispatch<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut dyn Engine) + Send + 'static,
    {
        match &self.shared.lock().dispatcher {
            Some(dispatcher) => dispatcher.submit(task),
            None => false,
        }
    }

    // ── Control surface ──────────────────────────────────────────────────────

    /// Navigate to `url`, or just remember it when no loop is running.
    pub fn set_url(&self, url: &str) {
        let mut inner = self.shared.lock();
        inner.url = url.to_string();
        if let Some(dispatcher) = &inner.dispatcher {
            let url = url.to_string();
            dispatcher.submit(move |engine| engine.load_url(&url));
        }
        debug!(url, "url requested");
    }

    /// Last requested or reported URL.
    pub fn url(&self) -> String {
        self.shared.lock().url.clone()
    }

    /// Latest one-second frame-rate sample; 0 without a loop or sampling.
    pub fn fps(&self) -> u32 {
        let inner = self.shared.lock();
        if !self.shared.fps_sampling || inner.dispatcher.is_none() {
            return 0;
        }
        inner.frames.fps()
    }

    /// The synchronously requested lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.shared.lock().machine.state()
    }

    /// Request a lifecycle transition. Returns as soon as the state is
    /// recorded; the engine applies it asynchronously.
    ///
    /// # Errors
    ///
    /// [`WebhostError::IllegalState`] for a command that would re-enter the
    /// current state. The state is left unchanged.
    pub fn request(&self, command: Command) -> Result<(), WebhostError> {
        let mut inner = self.shared.lock();
        let transition = inner.machine.request(command)?;
        debug!(%command, state = %transition.next, dispatch = transition.dispatch, "lifecycle request");
        if transition.dispatch {
            if let Some(dispatcher) = &inner.dispatcher {
                self.shared.dispatch_state(dispatcher, transition.next);
            }
        }
        Ok(())
    }

    pub fn suspend(&self) -> Result<(), WebhostError> {
        self.request(Command::Suspend)
    }

    pub fn resume(&self) -> Result<(), WebhostError> {
        self.request(Command::Resume)
    }

    /// Hide or show the view without touching the lifecycle state.
    /// Observers hear `on_hidden` only when the flag actually flips.
    pub fn hide(&self, hidden: bool) {
        let mut inner = self.shared.lock();
        let Some(dispatcher) = inner.dispatcher.clone() else {
            debug!(hidden, "no engine loop, ignoring visibility change");
            return;
        };
        if inner.hidden == hidden {
            return;
        }
        inner.hidden = hidden;
        self.shared.dispatch_hidden(&dispatcher, hidden);
    }

    pub fn is_hidden(&self) -> bool {
        self.shared.lock().hidden
    }

    // ── Observers ────────────────────────────────────────────────────────────

    pub fn register_state_observer(
        &self,
        observer: Arc<dyn StateObserver>,
    ) -> Result<(), WebhostError> {
        self.shared.hub.register_state_observer(observer)
    }

    pub fn unregister_state_observer(
        &self,
        observer: &Arc<dyn StateObserver>,
    ) -> Result<(), WebhostError> {
        self.shared.hub.unregister_state_observer(observer)
    }

    pub fn register_lifecycle_observer(
        &self,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<(), WebhostError> {
        self.shared.hub.register_lifecycle_observer(observer)
    }

    pub fn unregister_lifecycle_observer(
        &self,
        observer: &Arc<dyn LifecycleObserver>,
    ) -> Result<(), WebhostError> {
        self.shared.hub.unregister_lifecycle_observer(observer)
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.shared.hub
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.shared.hub.subscribe()
    }
}

impl Drop for BrowserSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

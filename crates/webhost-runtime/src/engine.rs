//! The seam between the supervisor and the rendering engine.
//!
//! An [`Engine`] is created *on* the engine loop thread by an
//! [`EngineFactory`] and never leaves it, so it does not need to be `Send`.
//! Everything the engine reports back (navigation, load completion, window
//! close requests, displayed frames) goes through the [`EngineEvents`]
//! handle in its [`EngineContext`].

use std::sync::Arc;

use tracing::error;
use webhost_types::{ViewState, WebhostError};

use crate::browser::{BrowserConfig, Shared};
use crate::dispatcher::Dispatcher;

/// Operations the supervisor performs on the engine. Only ever called from
/// the engine loop thread.
pub trait Engine {
    /// Start navigating to `url`.
    fn load_url(&mut self, url: &str);

    /// Apply window flags to the view.
    fn set_view_state(&mut self, view: ViewState);
}

/// Builds the engine on the loop thread.
pub type EngineFactory =
    Box<dyn FnOnce(EngineContext) -> Result<Box<dyn Engine>, WebhostError> + Send>;

/// Everything an engine gets at construction time.
pub struct EngineContext {
    pub config: BrowserConfig,
    pub events: EngineEvents,
    /// Lets the engine schedule follow-up work on its own loop.
    pub dispatcher: Dispatcher,
}

/// Callbacks from the engine into the supervisor.
#[derive(Clone)]
pub struct EngineEvents {
    shared: Arc<Shared>,
}

impl EngineEvents {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// A navigation started or the fragment changed.
    pub fn url_changed(&self, url: &str) {
        self.shared.url_changed(url);
    }

    /// The document finished loading.
    pub fn load_finished(&self, url: &str) {
        self.shared.load_finished(url);
    }

    /// Page script asked to close the window.
    pub fn closure_requested(&self) {
        self.shared.closure_requested();
    }

    /// A frame reached the screen.
    pub fn frame_displayed(&self) {
        self.shared.frame_displayed();
    }

    /// The engine's web process died. There is no local recovery: the
    /// supervising process exits and an external supervisor restarts it.
    pub fn crashed(&self) -> ! {
        error!("engine web process crashed, exiting");
        std::process::exit(1);
    }
}

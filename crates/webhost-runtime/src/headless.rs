//! [`HeadlessEngine`] – an in-process stand-in for a rendering engine.
//!
//! Navigation completes immediately and a local ticker reports a displayed
//! frame every `1 / max_fps` seconds while the view is visible and attached
//! to the window. Enough to run the supervisor end to end without a real
//! engine.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use webhost_types::ViewState;

use crate::engine::{Engine, EngineContext, EngineEvents, EngineFactory};

pub struct HeadlessEngine {
    events: EngineEvents,
    view: Rc<Cell<ViewState>>,
    ticker: JoinHandle<()>,
}

impl HeadlessEngine {
    /// Must be called on the engine loop thread.
    pub fn new(context: EngineContext) -> Self {
        let view = Rc::new(Cell::new(ViewState::default()));
        let period = Duration::from_secs(1) / context.config.max_fps.max(1);

        let ticker = tokio::task::spawn_local(tick(
            Rc::clone(&view),
            context.events.clone(),
            period,
        ));

        debug!(
            width = context.config.width,
            height = context.config.height,
            max_fps = context.config.max_fps,
            "headless engine created"
        );
        Self {
            events: context.events,
            view,
            ticker,
        }
    }

    pub fn factory() -> EngineFactory {
        Box::new(|context| Ok(Box::new(HeadlessEngine::new(context)) as Box<dyn Engine>))
    }
}

impl Engine for HeadlessEngine {
    fn load_url(&mut self, url: &str) {
        self.events.url_changed(url);
        self.events.load_finished(url);
    }

    fn set_view_state(&mut self, view: ViewState) {
        self.view.set(view);
    }
}

async fn tick(view: Rc<Cell<ViewState>>, events: EngineEvents, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let current = view.get();
        if current.visible && current.in_window {
            events.frame_displayed();
        }
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

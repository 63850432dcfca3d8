//! [`EngineLoop`] – the one thread allowed to touch the engine.
//!
//! The thread runs a single-threaded Tokio runtime inside a
//! [`LocalSet`](tokio::task::LocalSet), so the engine may spawn `!Send` local
//! tasks (timers, frame tickers) next to the dispatched work. The engine is
//! built on the thread by the [`EngineFactory`] and dropped there when the
//! loop stops.

use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webhost_types::WebhostError;

use crate::browser::BrowserConfig;
use crate::dispatcher::{Dispatcher, Message};
use crate::engine::{EngineContext, EngineEvents, EngineFactory};

const THREAD_NAME: &str = "webhost-engine";

/// Owner handle of a running engine loop thread.
pub struct EngineLoop {
    dispatcher: Dispatcher,
    stopped: std_mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl EngineLoop {
    /// Spawn the loop thread and build the engine on it.
    ///
    /// Returns once the factory has finished, so a failing engine start-up
    /// is reported here rather than lost on the other thread.
    pub fn spawn(
        factory: EngineFactory,
        config: BrowserConfig,
        events: EngineEvents,
    ) -> Result<Self, WebhostError> {
        let (dispatcher, rx) = Dispatcher::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stopped_tx, stopped_rx) = std_mpsc::sync_channel(1);

        let context = EngineContext {
            config,
            events,
            dispatcher: dispatcher.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(factory, context, rx, ready_tx, stopped_tx))
            .map_err(|e| WebhostError::EngineLoop(format!("failed to spawn engine thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                dispatcher,
                stopped: stopped_rx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(WebhostError::EngineLoop(
                    "engine thread exited during start-up".to_string(),
                ))
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Ask the loop to stop and wait up to `timeout` for it to report back.
    ///
    /// Tasks queued before this call still run; anything submitted after it
    /// is dropped.
    ///
    /// # Errors
    ///
    /// [`WebhostError::TeardownTimeout`] when the loop did not stop in time.
    /// The thread is left to finish on its own.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), WebhostError> {
        self.dispatcher.close();
        match self.stopped.recv_timeout(timeout) {
            // A disconnected channel means the thread is already gone.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("engine thread panicked");
                    }
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(WebhostError::TeardownTimeout(timeout)),
        }
    }
}

impl Drop for EngineLoop {
    fn drop(&mut self) {
        self.dispatcher.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop thread
// ─────────────────────────────────────────────────────────────────────────────

fn run(
    factory: EngineFactory,
    context: EngineContext,
    mut rx: mpsc::UnboundedReceiver<Message>,
    ready: std_mpsc::SyncSender<Result<(), WebhostError>>,
    stopped: std_mpsc::SyncSender<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(WebhostError::EngineLoop(format!(
                "failed to build engine runtime: {e}"
            ))));
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let mut engine = match factory(context) {
            Ok(engine) => engine,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        info!("engine loop started");

        let mut executed: u64 = 0;
        while let Some(message) = rx.recv().await {
            match message {
                Message::Run(task) => {
                    task(engine.as_mut());
                    executed += 1;
                }
                Message::Stop => break,
            }
        }
        debug!(executed, "engine loop draining");
        drop(engine);
    });

    info!("engine loop stopped");
    let _ = stopped.send(());
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use webhost_types::ViewState;

    use super::*;
    use crate::browser::Shared;
    use crate::engine::Engine;

    struct Loads(Arc<Mutex<Vec<String>>>);

    impl Engine for Loads {
        fn load_url(&mut self, url: &str) {
            self.0.lock().unwrap().push(url.to_string());
        }
        fn set_view_state(&mut self, _view: ViewState) {}
    }

    fn events() -> EngineEvents {
        EngineEvents::new(Arc::new(Shared::new(&BrowserConfig::default())))
    }

    #[test]
    fn runs_tasks_on_the_named_thread() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine_log = Arc::clone(&log);
        let engine_loop = EngineLoop::spawn(
            Box::new(move |_ctx| Ok(Box::new(Loads(engine_log)) as Box<dyn Engine>)),
            BrowserConfig::default(),
            events(),
        )
        .unwrap();

        let (tx, rx) = std_mpsc::channel();
        engine_loop.dispatcher().submit(move |engine| {
            engine.load_url("about:blank");
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(THREAD_NAME));

        engine_loop.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["about:blank"]);
    }

    #[test]
    fn factory_error_is_reported_by_spawn() {
        let result = EngineLoop::spawn(
            Box::new(|_ctx| Err(WebhostError::EngineLoop("no display".to_string()))),
            BrowserConfig::default(),
            events(),
        );
        assert_eq!(
            result.err(),
            Some(WebhostError::EngineLoop("no display".to_string()))
        );
    }

    #[test]
    fn shutdown_runs_already_queued_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine_log = Arc::clone(&log);
        let engine_loop = EngineLoop::spawn(
            Box::new(move |_ctx| Ok(Box::new(Loads(engine_log)) as Box<dyn Engine>)),
            BrowserConfig::default(),
            events(),
        )
        .unwrap();

        for url in ["a", "b", "c"] {
            engine_loop.dispatcher().submit(move |engine| engine.load_url(url));
        }
        let dispatcher = engine_loop.dispatcher().clone();
        engine_loop.shutdown(Duration::from_secs(5)).unwrap();

        assert!(!dispatcher.submit(|engine| engine.load_url("late")));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn shutdown_times_out_on_a_busy_loop() {
        let engine_loop = EngineLoop::spawn(
            Box::new(|_ctx| Ok(Box::new(Loads(Arc::default())) as Box<dyn Engine>)),
            BrowserConfig::default(),
            events(),
        )
        .unwrap();

        engine_loop
            .dispatcher()
            .submit(|_engine| std::thread::sleep(Duration::from_millis(300)));
        let timeout = Duration::from_millis(20);
        assert_eq!(
            engine_loop.shutdown(timeout),
            Err(WebhostError::TeardownTimeout(timeout))
        );
    }
}

//! `webhost-runtime` – Browser Instance Control Plane
//!
//! Owns the suspend/resume lifecycle of one embedded rendering engine and
//! bridges control requests from arbitrary threads onto the single thread
//! that may touch the engine.
//!
//! # Modules
//!
//! - [`browser`] – [`BrowserSupervisor`][browser::BrowserSupervisor]:
//!   the thread-safe control surface (URL, lifecycle requests, visibility,
//!   frame rate, observer registration) plus the typed
//!   [`BrowserConfig`][browser::BrowserConfig] it starts the engine with.
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]:
//!   the `Uninitialized → Suspended ⇄ Resumed` transition table, tracking the
//!   requested state separately from the one the engine confirmed.
//! - [`engine_loop`] – [`EngineLoop`][engine_loop::EngineLoop]:
//!   the dedicated engine thread running a current-thread Tokio runtime.
//! - [`dispatcher`] – [`Dispatcher`][dispatcher::Dispatcher]:
//!   fire-and-forget "run this on the engine loop" over an unbounded channel.
//! - [`engine`] – the [`Engine`][engine::Engine] trait, its factory and the
//!   [`EngineEvents`][engine::EngineEvents] callbacks into the supervisor.
//! - [`frame_rate`] – [`FrameCounter`][frame_rate::FrameCounter]:
//!   one-second windowed frame-rate sampling.
//! - [`headless`] – [`HeadlessEngine`][headless::HeadlessEngine]:
//!   an in-process engine stand-in for running without a real renderer.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.
//!
//! # Threading
//!
//! The engine handle never leaves the engine loop thread. Other threads
//! reach it only by dispatching closures, and engine state that a caller
//! needs must be copied out by such a closure.

pub mod browser;
pub mod dispatcher;
pub mod engine;
pub mod engine_loop;
pub mod frame_rate;
pub mod headless;
pub mod state_machine;
pub mod telemetry;

pub use browser::{BrowserConfig, BrowserSupervisor};
pub use dispatcher::{Dispatcher, Task};
pub use engine::{Engine, EngineContext, EngineEvents, EngineFactory};
pub use engine_loop::EngineLoop;
pub use frame_rate::FrameCounter;
pub use headless::HeadlessEngine;
pub use state_machine::{StateMachine, Transition, transition};
pub use telemetry::{TracerProviderGuard, init_tracing};

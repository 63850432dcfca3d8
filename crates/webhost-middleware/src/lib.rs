//! `webhost-middleware` – Observer Fan-out
//!
//! Carries lifecycle events from the engine loop thread to whoever cares,
//! without knowing what the events mean.
//!
//! # Modules
//!
//! - [`hub`] – [`NotificationHub`][hub::NotificationHub]: two independent
//!   observer registries (state-control and lifecycle) plus a Tokio
//!   broadcast stream of [`BrowserEvent`][webhost_types::BrowserEvent]s for
//!   async consumers.

pub mod hub;

pub use hub::{LifecycleObserver, NotificationHub, StateObserver};

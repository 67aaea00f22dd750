//! Per-object publish/subscribe channels.
//!
//! # Responsibility
//! - Deliver signals from one emitting object (record or collection) to its
//!   registered listeners.
//! - Split preventable operations into an intent phase and an effect phase.
//!
//! # Invariants
//! - Listeners run in registration order within a phase.
//! - No channel borrow is held while a listener runs, so listeners may
//!   mutate the emitting object or register/detach listeners.
//! - There is no global bus; every object owns its own channel.

mod target;

pub use target::{Decision, EventFacade, EventTarget, ListenerId, Phase, Signal};

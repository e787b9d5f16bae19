//! Domain events for the split engine.
//!
//! Events are published after the transaction that produced them has committed. Subscribers register async
//! closures through [`EventHooks`], and the engine receives [`EventProducers`] to publish with. A slow or failing
//! subscriber never affects the financial transaction.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};

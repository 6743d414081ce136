//! Core module: observer primitives shared by the protocol and network layers
//!
//! Prinsip desain:
//! - Synchronous: handlers run on the raising thread, in subscription order
//! - Non-owning: an event never controls a subscriber's lifetime

mod event;

pub use event::{Event, EventError, Handler, HandlerError, HandlerResult, OwnerId, SubscriptionError};

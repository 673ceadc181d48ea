//! Run events: creation, join requests, host decisions, leaving and
//! cancellation. Changes that touch the event chat are committed together
//! with the event and its outbox rows.

pub mod service;

pub use service::{RequestDecision, RunEventQuery, RunEventService};

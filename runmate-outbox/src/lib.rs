//! Publishes committed outbox rows to Redpanda.

pub mod poller;

pub use poller::run;

//! Turns published domain events into per-user push notifications.

pub mod consumer;
pub mod service;

pub use consumer::run;
pub use service::NotificationService;

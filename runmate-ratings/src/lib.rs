//! Peer ratings between runners who shared a run, support reports and the
//! derived rating statistics.

pub mod service;

pub use service::{PendingRating, RatingService};

#[cfg(test)]
mod tests;

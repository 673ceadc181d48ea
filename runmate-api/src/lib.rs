pub mod auth;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;
pub mod websocket;

pub use server::{router, run};
pub use state::ApiState;

#[cfg(test)]
mod tests;

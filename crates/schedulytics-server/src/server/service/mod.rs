//! gRPC service implementations.
//!
//! ## Structure
//!
//! - [`handler`] - job CRUD and streaming listing (`JobHandler`).
//! - [`hello`] - the greeting endpoint (`HelloHandler`).

pub mod handler;
pub mod hello;

#[cfg(test)]
mod tests;

pub mod app;
pub mod command;
pub mod engine;
pub mod error;
pub mod latch;
pub mod mode;
pub mod poll;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod setup;
pub mod transport;

#[cfg(test)]
mod fixtures;

pub mod client;
pub mod multiplex;
pub mod timing;
pub mod types;

pub use client::{EngineClient, EngineResponse};

//! FinServe prediction server
//!
//! Loads a precompiled model artifact once at startup and serves
//! feature-vector predictions over raw TCP with JSON-encoded outputs.

pub mod cli;
pub mod codec;
pub mod connection;
pub mod engine;
pub mod model;
pub mod server;

pub use engine::InferenceEngine;
pub use model::{MlpModel, Model, OutputMap};
pub use server::{PredictionServer, ShutdownHandle};

//! Inference engine binding a model handle to single predictions
//!
//! The engine owns the only reference to the loaded model that request
//! handling ever sees. It validates the input shape before the model is
//! invoked and normalizes model failures into the server's error type so
//! runtime internals never cross the component boundary.

use crate::model::{Model, OutputMap};
use finserve_common::{FinserveError, Result, METRICS};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Executes validated forward passes against a shared model handle
#[derive(Clone)]
pub struct InferenceEngine {
    model: Arc<dyn Model>,
}

impl InferenceEngine {
    /// Create a new inference engine over a loaded model
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Required feature-vector length
    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    /// Output names in declaration order
    pub fn output_names(&self) -> &[String] {
        self.model.output_names()
    }

    /// Run one prediction.
    ///
    /// Fails fast with a shape mismatch before the model is touched; any
    /// other model failure is wrapped as an inference error. No retries.
    pub fn run(&self, features: &[f32]) -> Result<OutputMap> {
        let expected = self.model.input_size();
        if features.len() != expected {
            return Err(FinserveError::ShapeMismatch {
                expected,
                actual: features.len(),
            });
        }

        let start = Instant::now();
        let outputs = self.model.predict(features).map_err(|e| match e {
            FinserveError::ShapeMismatch { expected, actual } => {
                FinserveError::ShapeMismatch { expected, actual }
            }
            other => FinserveError::inference(other.to_string()),
        })?;

        let elapsed = start.elapsed();
        METRICS.requests.predict_duration.observe(elapsed.as_secs_f64());
        debug!("Forward pass completed in {:?}", elapsed);

        Ok(outputs)
    }
}

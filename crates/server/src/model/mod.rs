//! Model loading and the prediction capability
//!
//! The server never depends on a concrete inference runtime directly: the
//! [`Model`] trait is the seam, and [`MlpModel`] is the runtime shipped with
//! this crate (a dense feed-forward network read from a memory-mapped
//! artifact).

pub mod artifact;
pub mod mlp;

pub use artifact::{ArtifactBuffer, TensorDType, TensorView};
pub use mlp::MlpModel;

use finserve_common::Result;

/// Ordered feature input to a single prediction
pub type FeatureVector = Vec<f32>;

/// Named output vectors produced by one prediction.
///
/// Entries keep the model's declaration order so response encoding is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputMap {
    entries: Vec<(String, Vec<f32>)>,
}

impl OutputMap {
    /// Create an empty output map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named output vector, replacing any previous entry of the
    /// same name.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = values;
        } else {
            self.entries.push((name, values));
        }
    }

    /// Get an output vector by name
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Iterate entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Number of named outputs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A loaded, immutable inference artifact.
///
/// Implementations must be pure for `predict`: no parameter updates, no
/// global state, no interior mutability. That makes concurrent calls from
/// multiple connection workers safe without locking.
pub trait Model: Send + Sync {
    /// Required feature-vector length
    fn input_size(&self) -> usize;

    /// Output names in declaration order
    fn output_names(&self) -> &[String];

    /// Run one forward pass over the fixed parameters
    fn predict(&self, features: &[f32]) -> Result<OutputMap>;
}

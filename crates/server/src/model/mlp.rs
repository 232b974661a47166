//! Dense feed-forward model loaded from an artifact
//!
//! Tensor naming contract: trunk layers are `layers.{i}.weight` (row-major
//! `[out, in]`) and `layers.{i}.bias` (`[out]`) with `i` contiguous from 0.
//! Optional named output heads are `heads.{name}.weight` / `heads.{name}.bias`
//! and read the final trunk activation. Hidden trunk layers use ReLU; with no
//! heads the final trunk layer is linear and declares the single output
//! `"output"`.

use crate::model::artifact::ArtifactBuffer;
use crate::model::{Model, OutputMap};
use finserve_common::{FinserveError, Result};
use std::path::Path;
use tracing::{debug, info};

/// One dense layer: `y = W·x + b`
#[derive(Debug)]
struct DenseLayer {
    /// Row-major `[out_dim, in_dim]` weights
    weight: Vec<f32>,
    bias: Vec<f32>,
    in_dim: usize,
    out_dim: usize,
}

impl DenseLayer {
    /// Read `{prefix}.weight` and `{prefix}.bias` from the artifact
    fn from_artifact(buffer: &ArtifactBuffer, prefix: &str) -> Result<Self> {
        let weight_name = format!("{}.weight", prefix);
        let bias_name = format!("{}.bias", prefix);

        let weight_view = buffer
            .get_tensor(&weight_name)
            .ok_or_else(|| FinserveError::model_load(format!("Missing tensor {}", weight_name)))?;

        if weight_view.shape().len() != 2 {
            return Err(FinserveError::model_load(format!(
                "Tensor {}: expected 2-D weight, got shape {:?}",
                weight_name,
                weight_view.shape()
            )));
        }
        let out_dim = weight_view.shape()[0];
        let in_dim = weight_view.shape()[1];
        if out_dim == 0 || in_dim == 0 {
            return Err(FinserveError::model_load(format!(
                "Tensor {}: zero-sized dimension in shape {:?}",
                weight_name,
                weight_view.shape()
            )));
        }

        let bias_view = buffer
            .get_tensor(&bias_name)
            .ok_or_else(|| FinserveError::model_load(format!("Missing tensor {}", bias_name)))?;

        if bias_view.len() != out_dim {
            return Err(FinserveError::model_load(format!(
                "Tensor {}: expected {} elements, got {}",
                bias_name,
                out_dim,
                bias_view.len()
            )));
        }

        Ok(Self {
            weight: weight_view.to_f32_vec(),
            bias: bias_view.to_f32_vec(),
            in_dim,
            out_dim,
        })
    }

    /// Compute `W·x + b`
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.in_dim);

        let mut output = Vec::with_capacity(self.out_dim);
        for row in 0..self.out_dim {
            let weights = &self.weight[row * self.in_dim..(row + 1) * self.in_dim];
            let mut sum = self.bias[row];
            for (w, x) in weights.iter().zip(input.iter()) {
                sum += w * x;
            }
            output.push(sum);
        }
        output
    }
}

/// Feed-forward model with optional named output heads.
///
/// Immutable after [`MlpModel::load`]; `predict` takes `&self` and touches
/// no shared state, so one handle can serve all connections concurrently.
#[derive(Debug)]
pub struct MlpModel {
    /// Trunk layers, in forward order
    layers: Vec<DenseLayer>,

    /// Named output heads, sorted by name at load
    heads: Vec<(String, DenseLayer)>,

    /// Output names in declaration order
    output_names: Vec<String>,

    /// Required feature-vector length
    input_size: usize,
}

impl MlpModel {
    /// Load a model from a serialized artifact.
    ///
    /// Fails if the trunk is empty, a tensor is missing or malformed, or the
    /// layer dimensions do not chain.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading model artifact from {}", path.display());

        let buffer = ArtifactBuffer::open(path)?;

        let mut layers = Vec::new();
        loop {
            let prefix = format!("layers.{}", layers.len());
            if buffer.get_tensor(&format!("{}.weight", prefix)).is_none() {
                break;
            }
            layers.push(DenseLayer::from_artifact(&buffer, &prefix)?);
        }

        if layers.is_empty() {
            return Err(FinserveError::model_load(format!(
                "Artifact {} declares no trunk layers",
                path.display()
            )));
        }

        for i in 1..layers.len() {
            if layers[i].in_dim != layers[i - 1].out_dim {
                return Err(FinserveError::model_load(format!(
                    "Layer {} input dim {} does not match layer {} output dim {}",
                    i,
                    layers[i].in_dim,
                    i - 1,
                    layers[i - 1].out_dim
                )));
            }
        }

        let trunk_out = layers.last().map(|l| l.out_dim).unwrap_or(0);

        let mut head_names: Vec<String> = buffer
            .tensor_names()
            .filter_map(|name| {
                name.strip_prefix("heads.")
                    .and_then(|rest| rest.strip_suffix(".weight"))
                    .map(str::to_string)
            })
            .collect();
        head_names.sort();

        let mut heads = Vec::with_capacity(head_names.len());
        for name in &head_names {
            let layer = DenseLayer::from_artifact(&buffer, &format!("heads.{}", name))?;
            if layer.in_dim != trunk_out {
                return Err(FinserveError::model_load(format!(
                    "Head {} input dim {} does not match trunk output dim {}",
                    name, layer.in_dim, trunk_out
                )));
            }
            heads.push((name.clone(), layer));
        }

        let output_names = if head_names.is_empty() {
            vec!["output".to_string()]
        } else {
            head_names
        };

        let input_size = layers[0].in_dim;

        info!(
            "Model loaded: {} trunk layers, {} heads, input size {}",
            layers.len(),
            heads.len(),
            input_size
        );
        debug!("Model outputs: {:?}", output_names);

        Ok(Self {
            layers,
            heads,
            output_names,
            input_size,
        })
    }
}

impl Model for MlpModel {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn predict(&self, features: &[f32]) -> Result<OutputMap> {
        if features.len() != self.input_size {
            return Err(FinserveError::ShapeMismatch {
                expected: self.input_size,
                actual: features.len(),
            });
        }

        let mut activation = features.to_vec();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(&activation);
            // Hidden layers are rectified; the trunk tail stays linear only
            // when it is itself the output.
            if i < last || !self.heads.is_empty() {
                for v in activation.iter_mut() {
                    *v = v.max(0.0);
                }
            }
        }

        let mut outputs = OutputMap::new();
        if self.heads.is_empty() {
            outputs.insert("output", activation);
        } else {
            for (name, head) in &self.heads {
                outputs.insert(name.clone(), head.forward(&activation));
            }
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Serialize named f32 tensors into an artifact file, in order.
    fn write_artifact(tensors: &[(&str, Vec<usize>, Vec<f32>)]) -> NamedTempFile {
        let mut entries = serde_json::Map::new();
        let mut offset = 0usize;
        for (name, shape, values) in tensors {
            let bytes = values.len() * 4;
            entries.insert(
                name.to_string(),
                json!({
                    "dtype": "F32",
                    "shape": shape,
                    "data_offsets": [offset, offset + bytes]
                }),
            );
            offset += bytes;
        }

        let header_json = serde_json::to_string(&json!({ "tensors": entries })).unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&(header_json.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header_json.as_bytes()).unwrap();
        for (_, _, values) in tensors {
            for v in values {
                file.write_all(&v.to_le_bytes()).unwrap();
            }
        }
        file.flush().unwrap();

        file
    }

    /// 4-input identity model: one trunk layer, no heads.
    fn identity_artifact() -> NamedTempFile {
        let mut weight = vec![0.0f32; 16];
        for i in 0..4 {
            weight[i * 4 + i] = 1.0;
        }
        write_artifact(&[
            ("layers.0.weight", vec![4, 4], weight),
            ("layers.0.bias", vec![4], vec![0.0; 4]),
        ])
    }

    #[test]
    fn test_load_identity_model() {
        let file = identity_artifact();
        let model = MlpModel::load(file.path()).unwrap();

        assert_eq!(model.input_size(), 4);
        assert_eq!(model.output_names(), &["output".to_string()]);
    }

    #[test]
    fn test_predict_identity_passthrough() {
        let file = identity_artifact();
        let model = MlpModel::load(file.path()).unwrap();

        let out = model.predict(&[0.1, 0.2, -0.3, 0.4]).unwrap();
        assert_eq!(out.get("output"), Some(&[0.1, 0.2, -0.3, 0.4][..]));
    }

    #[test]
    fn test_predict_deterministic() {
        let file = identity_artifact();
        let model = MlpModel::load(file.path()).unwrap();

        let features = [0.5f32, -1.5, 2.0, 0.0];
        let first = model.predict(&features).unwrap();
        let second = model.predict(&features).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let file = identity_artifact();
        let model = MlpModel::load(file.path()).unwrap();

        let err = model.predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            FinserveError::ShapeMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_hidden_layer_relu() {
        // 1 -> 1 -> 1 with negated input: the hidden activation is clamped
        // to zero, so only the final bias survives.
        let file = write_artifact(&[
            ("layers.0.weight", vec![1, 1], vec![-1.0]),
            ("layers.0.bias", vec![1], vec![0.0]),
            ("layers.1.weight", vec![1, 1], vec![3.0]),
            ("layers.1.bias", vec![1], vec![0.5]),
        ]);
        let model = MlpModel::load(file.path()).unwrap();

        let out = model.predict(&[2.0]).unwrap();
        assert_eq!(out.get("output"), Some(&[0.5][..]));
    }

    #[test]
    fn test_named_heads_sorted() {
        let file = write_artifact(&[
            ("layers.0.weight", vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]),
            ("layers.0.bias", vec![2], vec![0.0, 0.0]),
            ("heads.volatility.weight", vec![1, 2], vec![0.0, 1.0]),
            ("heads.volatility.bias", vec![1], vec![0.0]),
            ("heads.price.weight", vec![1, 2], vec![1.0, 0.0]),
            ("heads.price.bias", vec![1], vec![0.0]),
        ]);
        let model = MlpModel::load(file.path()).unwrap();

        assert_eq!(
            model.output_names(),
            &["price".to_string(), "volatility".to_string()]
        );

        let out = model.predict(&[3.0, 7.0]).unwrap();
        assert_eq!(out.get("price"), Some(&[3.0][..]));
        assert_eq!(out.get("volatility"), Some(&[7.0][..]));
    }

    #[test]
    fn test_dimension_chain_mismatch_rejected() {
        let file = write_artifact(&[
            ("layers.0.weight", vec![2, 3], vec![0.0; 6]),
            ("layers.0.bias", vec![2], vec![0.0; 2]),
            ("layers.1.weight", vec![1, 4], vec![0.0; 4]),
            ("layers.1.bias", vec![1], vec![0.0]),
        ]);

        let err = MlpModel::load(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::ModelLoad(_)));
    }

    #[test]
    fn test_missing_bias_rejected() {
        let file = write_artifact(&[("layers.0.weight", vec![2, 2], vec![0.0; 4])]);

        let err = MlpModel::load(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::ModelLoad(_)));
    }

    #[test]
    fn test_empty_artifact_rejected() {
        let file = write_artifact(&[]);

        let err = MlpModel::load(file.path()).unwrap_err();
        assert!(matches!(err, FinserveError::ModelLoad(_)));
    }
}

//! Named f32 tensors for the recurrent, attention and classifier heads.
//!
//! Loaded from a SafeTensors file using PyTorch state-dict names. Encoder
//! tensors stored in the same file are skipped; only the head prefixes are
//! materialized.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array1, Array2};
use safetensors::{Dtype, SafeTensors};

use super::ModelError;

/// State-dict prefixes owned by the aggregation and classification heads.
pub const HEAD_PREFIXES: [&str; 3] = ["lstm.", "attn.", "classifier."];

#[derive(Debug, Clone)]
struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct WeightMap {
    tensors: HashMap<String, Tensor>,
}

impl WeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) {
        self.tensors.insert(name.into(), Tensor { shape, data });
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Read a SafeTensors file from disk.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let map = Self::from_safetensors(&bytes)?;
        tracing::info!(
            path = %path.display(),
            tensors = map.len(),
            size = bytes.len(),
            "Model weights loaded"
        );
        Ok(map)
    }

    /// Parse an in-memory SafeTensors buffer, keeping head tensors only.
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, ModelError> {
        let tensors =
            SafeTensors::deserialize(bytes).map_err(|e| ModelError::SafeTensors(e.to_string()))?;

        let mut map = Self::new();
        for (name, view) in tensors.tensors() {
            if !HEAD_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if view.dtype() != Dtype::F32 {
                return Err(ModelError::UnsupportedDtype {
                    name,
                    dtype: format!("{:?}", view.dtype()),
                });
            }
            let data = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            map.insert(name, view.shape().to_vec(), data);
        }

        Ok(map)
    }

    /// Fetch a `[rows, cols]` matrix, validating its shape.
    pub fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>, ModelError> {
        let tensor = self.get(name, &[rows, cols])?;
        Array2::from_shape_vec((rows, cols), tensor.data.clone()).map_err(|_| {
            ModelError::ShapeMismatch {
                name: name.to_string(),
                expected: vec![rows, cols],
                actual: tensor.shape.clone(),
            }
        })
    }

    /// Fetch a `[len]` vector, validating its shape.
    pub fn vector(&self, name: &str, len: usize) -> Result<Array1<f32>, ModelError> {
        let tensor = self.get(name, &[len])?;
        Ok(Array1::from_vec(tensor.data.clone()))
    }

    fn get(&self, name: &str, expected: &[usize]) -> Result<&Tensor, ModelError> {
        let tensor = self
            .tensors
            .get(name)
            .ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;

        let numel: usize = expected.iter().product();
        if tensor.shape != expected || tensor.data.len() != numel {
            return Err(ModelError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                actual: tensor.shape.clone(),
            });
        }
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::TensorView;

    fn to_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    #[test]
    fn matrix_checks_shape() {
        let mut map = WeightMap::new();
        map.insert("attn.0.weight", vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let m = map.matrix("attn.0.weight", 2, 3).unwrap();
        assert_eq!(m[[1, 0]], 4.0);

        let err = map.matrix("attn.0.weight", 3, 2).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn missing_tensor_is_reported_by_name() {
        let map = WeightMap::new();
        match map.vector("classifier.bias", 2) {
            Err(ModelError::MissingTensor(name)) => assert_eq!(name, "classifier.bias"),
            other => panic!("expected MissingTensor, got {other:?}"),
        }
    }

    #[test]
    fn safetensors_keeps_head_tensors_only() {
        let bias = to_bytes(&[0.5, -0.5]);
        let encoder = to_bytes(&[9.0; 4]);

        let mut tensors: HashMap<String, TensorView<'_>> = HashMap::new();
        tensors.insert(
            "classifier.bias".to_string(),
            TensorView::new(Dtype::F32, vec![2], &bias).unwrap(),
        );
        tensors.insert(
            "roberta.embeddings.word_embeddings.weight".to_string(),
            TensorView::new(Dtype::F32, vec![2, 2], &encoder).unwrap(),
        );
        let bytes = safetensors::serialize(&tensors, &None).unwrap();

        let map = WeightMap::from_safetensors(&bytes).unwrap();
        assert_eq!(map.len(), 1);
        assert!(!map.contains("roberta.embeddings.word_embeddings.weight"));
        assert_eq!(map.vector("classifier.bias", 2).unwrap().to_vec(), vec![0.5, -0.5]);
    }

    #[test]
    fn non_f32_head_tensor_is_rejected() {
        let half = vec![0u8; 4];
        let mut tensors: HashMap<String, TensorView<'_>> = HashMap::new();
        tensors.insert(
            "classifier.bias".to_string(),
            TensorView::new(Dtype::F16, vec![2], &half).unwrap(),
        );
        let bytes = safetensors::serialize(&tensors, &None).unwrap();

        let err = WeightMap::from_safetensors(&bytes).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedDtype { .. }));
    }

    #[test]
    fn garbage_bytes_are_a_safetensors_error() {
        let err = WeightMap::from_safetensors(b"not a tensor file").unwrap_err();
        assert!(matches!(err, ModelError::SafeTensors(_)));
    }
}

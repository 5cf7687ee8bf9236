//! Persisted model parameters.
//!
//! A model directory holds:
//! - `config.json` — architecture scalars (HuggingFace-style config; extra keys ignored)
//! - `model.safetensors` — recurrent, attention and classifier weights
//!
//! Loaded once at startup and never mutated afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::aggregator::{AttentionPooling, BiLstm, BiLstmLayer, Linear, LstmCell, SequenceAggregator};
use super::classifier::Classifier;
use super::temporal::TEMPORAL_FEATURE_DIM;
use super::weights::WeightMap;
use super::ModelError;

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

// ═══════════════════════════════════════════════════════════
// Config
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Width of the visit embedding produced by the text encoder.
    pub hidden_size: usize,
    /// Per-direction LSTM state width.
    pub lstm_hidden: usize,
    #[serde(default = "default_lstm_layers")]
    pub lstm_layers: usize,
    pub attn_dim: usize,
    #[serde(default = "default_visit_time_dim")]
    pub visit_time_dim: usize,
    pub output_dim: usize,
    /// Token budget per visit note.
    pub max_length: usize,
    #[serde(default = "default_positive_class")]
    pub positive_class: usize,
}

fn default_lstm_layers() -> usize {
    1
}

fn default_visit_time_dim() -> usize {
    TEMPORAL_FEATURE_DIM
}

fn default_positive_class() -> usize {
    1
}

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.visit_time_dim != TEMPORAL_FEATURE_DIM {
            return Err(ModelError::InvalidConfig(format!(
                "visit_time_dim must be {TEMPORAL_FEATURE_DIM}, got {}",
                self.visit_time_dim
            )));
        }
        let sizes = [
            ("hidden_size", self.hidden_size),
            ("lstm_hidden", self.lstm_hidden),
            ("lstm_layers", self.lstm_layers),
            ("attn_dim", self.attn_dim),
            ("output_dim", self.output_dim),
            ("max_length", self.max_length),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.positive_class >= self.output_dim {
            return Err(ModelError::InvalidConfig(format!(
                "positive_class {} out of range for output_dim {}",
                self.positive_class, self.output_dim
            )));
        }
        Ok(())
    }

    /// Per-visit input width: embedding followed by temporal features.
    pub fn visit_input_dim(&self) -> usize {
        self.hidden_size + self.visit_time_dim
    }

    pub fn pooled_dim(&self) -> usize {
        2 * self.lstm_hidden
    }

    /// Every head tensor the bundle must provide, with its shape.
    pub fn tensor_layout(&self) -> Vec<(String, Vec<usize>)> {
        let gates = 4 * self.lstm_hidden;
        let mut layout = Vec::new();
        for layer in 0..self.lstm_layers {
            let input = self.layer_input_dim(layer);
            for suffix in ["", "_reverse"] {
                layout.push((format!("lstm.weight_ih_l{layer}{suffix}"), vec![gates, input]));
                layout.push((format!("lstm.weight_hh_l{layer}{suffix}"), vec![gates, self.lstm_hidden]));
                layout.push((format!("lstm.bias_ih_l{layer}{suffix}"), vec![gates]));
                layout.push((format!("lstm.bias_hh_l{layer}{suffix}"), vec![gates]));
            }
        }
        layout.push(("attn.0.weight".into(), vec![self.attn_dim, self.pooled_dim()]));
        layout.push(("attn.0.bias".into(), vec![self.attn_dim]));
        layout.push(("attn.2.weight".into(), vec![1, self.attn_dim]));
        layout.push(("attn.2.bias".into(), vec![1]));
        layout.push(("classifier.weight".into(), vec![self.output_dim, self.pooled_dim()]));
        layout.push(("classifier.bias".into(), vec![self.output_dim]));
        layout
    }

    fn layer_input_dim(&self, layer: usize) -> usize {
        if layer == 0 {
            self.visit_input_dim()
        } else {
            self.pooled_dim()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Model
// ═══════════════════════════════════════════════════════════

/// Aggregation and classification heads with their configuration.
#[derive(Debug, Clone)]
pub struct LstmAttentionModel {
    config: ModelConfig,
    aggregator: SequenceAggregator,
    classifier: Classifier,
}

impl LstmAttentionModel {
    /// Load `config.json` and `model.safetensors` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let config = ModelConfig::load(&model_dir.join(CONFIG_FILE))?;
        let weights = WeightMap::load(&model_dir.join(WEIGHTS_FILE))?;
        let model = Self::from_weights(config, &weights)?;

        tracing::info!(
            model_dir = %model_dir.display(),
            hidden_size = model.config.hidden_size,
            lstm_hidden = model.config.lstm_hidden,
            lstm_layers = model.config.lstm_layers,
            "LSTM attention model ready"
        );
        Ok(model)
    }

    pub fn from_weights(config: ModelConfig, weights: &WeightMap) -> Result<Self, ModelError> {
        config.validate()?;

        let gates = 4 * config.lstm_hidden;
        let hidden = config.lstm_hidden;
        let mut layers = Vec::with_capacity(config.lstm_layers);
        for layer in 0..config.lstm_layers {
            let input = config.layer_input_dim(layer);
            let cell = |suffix: &str| -> Result<LstmCell, ModelError> {
                LstmCell::new(
                    weights.matrix(&format!("lstm.weight_ih_l{layer}{suffix}"), gates, input)?,
                    weights.matrix(&format!("lstm.weight_hh_l{layer}{suffix}"), gates, hidden)?,
                    weights.vector(&format!("lstm.bias_ih_l{layer}{suffix}"), gates)?,
                    weights.vector(&format!("lstm.bias_hh_l{layer}{suffix}"), gates)?,
                )
            };
            layers.push(BiLstmLayer::new(cell("")?, cell("_reverse")?)?);
        }

        let pooled = config.pooled_dim();
        let attention = AttentionPooling::new(
            Linear::new(
                weights.matrix("attn.0.weight", config.attn_dim, pooled)?,
                weights.vector("attn.0.bias", config.attn_dim)?,
            )?,
            Linear::new(
                weights.matrix("attn.2.weight", 1, config.attn_dim)?,
                weights.vector("attn.2.bias", 1)?,
            )?,
        )?;
        let aggregator = SequenceAggregator::new(BiLstm::new(layers)?, attention)?;

        let classifier = Classifier::new(
            Linear::new(
                weights.matrix("classifier.weight", config.output_dim, pooled)?,
                weights.vector("classifier.bias", config.output_dim)?,
            )?,
            config.positive_class,
        )?;

        Ok(Self {
            config,
            aggregator,
            classifier,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &SequenceAggregator {
        &self.aggregator
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }
}

// ═══════════════════════════════════════════════════════════
// Test support
// ═══════════════════════════════════════════════════════════

//! Case classification pipeline.
//!
//! ```text
//! dates → impute → log-deltas ─┐
//!                              ├→ BiLSTM → attention pooling → classifier
//! texts → visit encoder ───────┘
//! ```
//!
//! Every stage is a pure function of its inputs plus the immutable model
//! bundle, so one `PredictionPipeline` can be shared across threads.

pub mod aggregator;
pub mod classifier;
pub mod dates;
pub mod encoder;
pub mod model;
pub mod numeric;
pub mod predictor;
pub mod record;
pub mod temporal;
pub mod weights;

use std::path::PathBuf;

use thiserror::Error;

pub use aggregator::{Aggregation, SequenceAggregator};
pub use classifier::Classifier;
pub use encoder::{MockVisitEncoder, VisitEncoder};
pub use model::{LstmAttentionModel, ModelConfig};
pub use predictor::{case_timeline, CaseTimeline, PredictionPipeline, PredictionResult, SequenceClassifier};
pub use record::{build_record, Footer, NlpRecord};
pub use temporal::TemporalFeature;

#[cfg(feature = "onnx-embeddings")]
pub use encoder::OnnxVisitEncoder;

/// Failure of a single case prediction. A case either yields a complete
/// probability + attention pair or one of these.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Invalid input shape: {0}")]
    InputShape(String),

    #[error("Visit {index}: date '{value}' does not match DDMonYYYY")]
    DateParse { index: usize, value: String },

    #[error("Visit {index}: imputed date falls outside the supported calendar range")]
    DateOutOfRange { index: usize },

    #[error("Visit {index}: {feature} delta of {delta_days} days is outside the log1p domain")]
    NumericDomain {
        index: usize,
        feature: &'static str,
        delta_days: f64,
    },

    #[error("Visit {index}: encoder failed: {source}")]
    Encoder {
        index: usize,
        #[source]
        source: EncoderError,
    },

    #[error("Non-finite values while computing {stage}")]
    NonFinite { stage: &'static str },
}

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Encoder initialization: {0}")]
    ModelInit(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Encoder inference failed: {0}")]
    Inference(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

/// Failure while loading or assembling the persisted model bundle.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    #[error("SafeTensors error: {0}")]
    SafeTensors(String),

    #[error("Tensor not found in bundle: {0}")]
    MissingTensor(String),

    #[error("Tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Encoder produces {actual}-dim embeddings, model expects {expected}")]
    EncoderDimension { expected: usize, actual: usize },

    #[error("Visit encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
}

//! Single-case orchestration: dates → temporal features → visit embeddings →
//! aggregation → classification.

use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array2;
use serde::Serialize;

use super::dates::{impute_dates, parse_visit_dates};
use super::encoder::VisitEncoder;
use super::model::LstmAttentionModel;
use super::temporal::{encode_deltas, TemporalFeature, TEMPORAL_FEATURE_DIM};
use super::{EncoderError, ModelError, PredictionError};

/// Name reported in serialized records.
pub const MODEL_NAME: &str = "lstm_attention";

/// Probability of the positive class plus one attention weight per visit,
/// in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub probability: f32,
    pub attention_weights: Vec<f32>,
}

/// Anything that turns a case into a [`PredictionResult`]. Orchestration
/// and serialization depend on this, not on the concrete aggregation model.
pub trait SequenceClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict(
        &self,
        texts: &[String],
        dates: &[Option<String>],
    ) -> Result<PredictionResult, PredictionError>;
}

// ═══════════════════════════════════════════════════════════
// Timeline
// ═══════════════════════════════════════════════════════════

/// Resolved dates and their temporal features for one case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseTimeline {
    pub dates: Vec<NaiveDate>,
    pub features: Vec<TemporalFeature>,
}

/// Parse, impute and encode the raw dates of a case.
pub fn case_timeline(raw_dates: &[Option<String>]) -> Result<CaseTimeline, PredictionError> {
    let parsed = parse_visit_dates(raw_dates)?;
    let dates = impute_dates(&parsed)?;
    let features = encode_deltas(&dates)?;
    Ok(CaseTimeline { dates, features })
}

// ═══════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════

/// Immutable model bundle plus visit encoder, shared by every prediction.
pub struct PredictionPipeline {
    model: LstmAttentionModel,
    encoder: Box<dyn VisitEncoder>,
}

impl PredictionPipeline {
    pub fn new(model: LstmAttentionModel, encoder: Box<dyn VisitEncoder>) -> Result<Self, ModelError> {
        let expected = model.config().hidden_size;
        if encoder.dimension() != expected {
            return Err(ModelError::EncoderDimension {
                expected,
                actual: encoder.dimension(),
            });
        }
        Ok(Self { model, encoder })
    }

    /// Load heads and the ONNX text encoder from one bundle directory.
    #[cfg(feature = "onnx-embeddings")]
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let model = LstmAttentionModel::load(model_dir)?;
        let encoder = super::encoder::OnnxVisitEncoder::load(model_dir, model.config().hidden_size)?;
        Self::new(model, Box::new(encoder))
    }

    #[cfg(not(feature = "onnx-embeddings"))]
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        // Validate the heads so a broken bundle is reported before the encoder.
        LstmAttentionModel::load(model_dir)?;
        Err(ModelError::EncoderUnavailable(
            "built without the onnx-embeddings feature".into(),
        ))
    }

    pub fn model(&self) -> &LstmAttentionModel {
        &self.model
    }

    /// `[V, hidden_size + 2]` input rows, embedding first.
    fn augment(
        &self,
        texts: &[String],
        features: &[TemporalFeature],
    ) -> Result<Array2<f32>, PredictionError> {
        let config = self.model.config();
        let width = config.hidden_size;
        let mut visits = Array2::zeros((texts.len(), width + TEMPORAL_FEATURE_DIM));

        for (index, (text, feature)) in texts.iter().zip(features).enumerate() {
            let embedding = self
                .encoder
                .encode_text(text, config.max_length)
                .map_err(|source| PredictionError::Encoder { index, source })?;
            if embedding.len() != width {
                return Err(PredictionError::Encoder {
                    index,
                    source: EncoderError::Dimension {
                        expected: width,
                        actual: embedding.len(),
                    },
                });
            }

            let mut row = visits.row_mut(index);
            for (slot, value) in row.iter_mut().zip(embedding.iter().chain(&feature.to_array())) {
                *slot = *value;
            }
        }
        Ok(visits)
    }
}

impl SequenceClassifier for PredictionPipeline {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn predict(
        &self,
        texts: &[String],
        dates: &[Option<String>],
    ) -> Result<PredictionResult, PredictionError> {
        if texts.is_empty() {
            return Err(PredictionError::InputShape("case has no visits".into()));
        }
        if texts.len() != dates.len() {
            return Err(PredictionError::InputShape(format!(
                "case has {} notes but {} dates",
                texts.len(),
                dates.len()
            )));
        }

        let timeline = case_timeline(dates)?;
        let visits = self.augment(texts, &timeline.features)?;

        let aggregation = self.model.aggregator().aggregate(visits.view())?;
        let probability = self.model.classifier().classify(&aggregation.pooled)?;

        tracing::debug!(visits = texts.len(), probability, "Case classified");

        Ok(PredictionResult {
            probability,
            attention_weights: aggregation.attention_weights.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::encoder::MockVisitEncoder;
    use crate::pipeline::model::test_support::{synthetic_model, tiny_config};

    /// Counts calls and delegates to the mock encoder.
    struct CountingEncoder {
        calls: Arc<AtomicUsize>,
        inner: MockVisitEncoder,
    }

    impl VisitEncoder for CountingEncoder {
        fn encode_text(&self, text: &str, max_length: usize) -> Result<Vec<f32>, EncoderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.encode_text(text, max_length)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    /// Same embedding for every note.
    struct ConstantEncoder(usize);

    impl VisitEncoder for ConstantEncoder {
        fn encode_text(&self, _text: &str, _max_length: usize) -> Result<Vec<f32>, EncoderError> {
            Ok(vec![0.25; self.0])
        }

        fn dimension(&self) -> usize {
            self.0
        }
    }

    /// Fails on notes containing "boom".
    struct FailingEncoder(usize);

    impl VisitEncoder for FailingEncoder {
        fn encode_text(&self, text: &str, _max_length: usize) -> Result<Vec<f32>, EncoderError> {
            if text.contains("boom") {
                return Err(EncoderError::Inference("runtime exploded".into()));
            }
            Ok(vec![0.0; self.0])
        }

        fn dimension(&self) -> usize {
            self.0
        }
    }

    fn counting_pipeline() -> (PredictionPipeline, Arc<AtomicUsize>) {
        let config = tiny_config();
        let calls = Arc::new(AtomicUsize::new(0));
        let encoder = CountingEncoder {
            calls: calls.clone(),
            inner: MockVisitEncoder::new(config.hidden_size),
        };
        let pipeline = PredictionPipeline::new(synthetic_model(&config), Box::new(encoder)).unwrap();
        (pipeline, calls)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn dates(items: &[Option<&str>]) -> Vec<Option<String>> {
        items.iter().map(|d| d.map(str::to_string)).collect()
    }

    #[test]
    fn single_undated_visit() {
        let timeline = case_timeline(&dates(&[None])).unwrap();
        assert_eq!(timeline.dates, vec![NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()]);
        assert_eq!(timeline.features, vec![TemporalFeature::ZERO]);

        let (pipeline, calls) = counting_pipeline();
        let result = pipeline.predict(&texts(&["note A"]), &dates(&[None])).unwrap();
        assert_eq!(result.attention_weights, vec![1.0]);
        assert!((0.0..=1.0).contains(&result.probability));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interior_gap_is_interpolated_by_day_count() {
        let raw = dates(&[Some("01Jan2024"), None, Some("01Mar2024")]);
        let timeline = case_timeline(&raw).unwrap();
        assert_eq!(timeline.dates[1], NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert!(timeline
            .features
            .windows(2)
            .all(|w| w[1].log_start > w[0].log_start));

        let (pipeline, _) = counting_pipeline();
        let result = pipeline.predict(&texts(&["a", "b", "c"]), &raw).unwrap();
        assert_eq!(result.attention_weights.len(), 3);
        let sum: f32 = result.attention_weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn length_mismatch_never_reaches_encoder() {
        let (pipeline, calls) = counting_pipeline();
        let err = pipeline
            .predict(&texts(&["a", "b", "c"]), &dates(&[None, None]))
            .unwrap_err();
        assert!(matches!(err, PredictionError::InputShape(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_case_is_rejected() {
        let (pipeline, calls) = counting_pipeline();
        let err = pipeline.predict(&[], &[]).unwrap_err();
        assert!(matches!(err, PredictionError::InputShape(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bad_date_fails_before_encoding() {
        let (pipeline, calls) = counting_pipeline();
        let err = pipeline
            .predict(&texts(&["a", "b"]), &dates(&[Some("2024-01-01"), None]))
            .unwrap_err();
        match err {
            PredictionError::DateParse { index, value } => {
                assert_eq!(index, 0);
                assert_eq!(value, "2024-01-01");
            }
            other => panic!("expected DateParse, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn out_of_order_dates_are_a_numeric_error() {
        let (pipeline, calls) = counting_pipeline();
        let err = pipeline
            .predict(
                &texts(&["a", "b"]),
                &dates(&[Some("10Mar2024"), Some("01Jan2024")]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::NumericDomain { index: 1, feature: "log_prev", .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn encoder_failure_fails_the_case() {
        let config = tiny_config();
        let pipeline =
            PredictionPipeline::new(synthetic_model(&config), Box::new(FailingEncoder(config.hidden_size)))
                .unwrap();
        let err = pipeline
            .predict(&texts(&["fine", "boom", "fine"]), &dates(&[None, None, None]))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::Encoder {
                index: 1,
                source: EncoderError::Inference(_)
            }
        ));
    }

    #[test]
    fn encoder_width_must_match_model() {
        let config = tiny_config();
        let err = PredictionPipeline::new(
            synthetic_model(&config),
            Box::new(MockVisitEncoder::new(config.hidden_size + 1)),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ModelError::EncoderDimension { .. }));
    }

    #[test]
    fn identical_visits_get_permutation_invariant_weights() {
        let config = tiny_config();
        let pipeline =
            PredictionPipeline::new(synthetic_model(&config), Box::new(ConstantEncoder(config.hidden_size)))
                .unwrap();
        let same_day = dates(&[Some("05May2024"); 4]);

        let a = pipeline.predict(&texts(&["w", "x", "y", "z"]), &same_day).unwrap();
        let b = pipeline.predict(&texts(&["z", "y", "x", "w"]), &same_day).unwrap();

        let mut wa = a.attention_weights.clone();
        let mut wb = b.attention_weights.clone();
        wa.sort_by(f32::total_cmp);
        wb.sort_by(f32::total_cmp);
        assert_eq!(wa, wb);
        assert_eq!(a.probability, b.probability);
    }

    #[test]
    fn predictions_are_deterministic() {
        let (pipeline, _) = counting_pipeline();
        let raw = dates(&[Some("01Jan2024"), None, Some("15Feb2024"), None]);
        let case = texts(&["fiebre", "disnea", "palpitaciones", "control"]);
        let first = pipeline.predict(&case, &raw).unwrap();
        let second = pipeline.predict(&case, &raw).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(not(feature = "onnx-embeddings"))]
    #[test]
    fn load_without_onnx_reports_missing_encoder() {
        use crate::pipeline::model::{test_support::synthetic_tensors, CONFIG_FILE, WEIGHTS_FILE};
        use safetensors::tensor::TensorView;
        use safetensors::Dtype;
        use std::collections::HashMap;

        let config = tiny_config();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), serde_json::to_string(&config).unwrap()).unwrap();

        let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = synthetic_tensors(&config)
            .into_iter()
            .map(|(n, s, d)| (n, s, d.iter().flat_map(|f| f.to_le_bytes()).collect()))
            .collect();
        let tensors: HashMap<String, TensorView<'_>> = buffers
            .iter()
            .map(|(n, s, d)| (n.clone(), TensorView::new(Dtype::F32, s.clone(), d).unwrap()))
            .collect();
        std::fs::write(
            dir.path().join(WEIGHTS_FILE),
            safetensors::serialize(&tensors, &None).unwrap(),
        )
        .unwrap();

        let err = PredictionPipeline::load(dir.path()).err().unwrap();
        assert!(matches!(err, ModelError::EncoderUnavailable(_)));
    }
}

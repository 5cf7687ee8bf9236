use super::EncoderError;

/// Maps one visit note to a fixed-width embedding.
///
/// Implementations must be deterministic: the same text and `max_length`
/// always yield the same vector of length `dimension()`.
pub trait VisitEncoder: Send + Sync {
    fn encode_text(&self, text: &str, max_length: usize) -> Result<Vec<f32>, EncoderError>;
    fn dimension(&self) -> usize;
}

// ═══════════════════════════════════════════════════════════
// ONNX Encoder — behind `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{fit_to_length, EncoderError, VisitEncoder};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;
    use tokenizers::{PostProcessor, TruncationDirection};

    const PAD_TOKEN: &str = "<pad>";
    /// RoBERTa vocabularies place `<pad>` at id 1.
    const DEFAULT_PAD_ID: u32 = 1;

    /// Transformer text encoder exported to ONNX (last hidden state output).
    ///
    /// Requires two files in the model directory:
    /// - `model.onnx` — the exported encoder
    /// - `tokenizer.json` — HuggingFace tokenizer definition
    ///
    /// ort::Session::run requires `&mut self`, so concurrent cases are
    /// serialized on the session mutex.
    pub struct OnnxVisitEncoder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
        pad_id: u32,
        dimension: usize,
    }

    impl OnnxVisitEncoder {
        /// Load the encoder from `model_dir`. `dimension` is the embedding
        /// width recorded in the model config.
        pub fn load(model_dir: &Path, dimension: usize) -> Result<Self, EncoderError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(EncoderError::ModelNotFound(model_path));
            }
            if !tokenizer_path.exists() {
                return Err(EncoderError::ModelNotFound(tokenizer_path));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| EncoderError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| EncoderError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| EncoderError::ModelInit(format!("ONNX load failed: {e}")))?;

            let mut tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| EncoderError::ModelInit(format!("Tokenizer load failed: {e}")))?;
            // Truncation and padding are applied per call with the requested max_length.
            tokenizer
                .with_truncation(None)
                .map_err(|e| EncoderError::ModelInit(e.to_string()))?;
            tokenizer.with_padding(None);

            let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(DEFAULT_PAD_ID);

            tracing::info!(dimension, "ONNX visit encoder loaded from {}", model_dir.display());

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                pad_id,
                dimension,
            })
        }

        /// Token ids and attention mask, truncated and padded to exactly `max_length`.
        fn tokenize(&self, text: &str, max_length: usize) -> Result<(Vec<i64>, Vec<i64>), EncoderError> {
            let mut encoding = self
                .tokenizer
                .encode(text, false)
                .map_err(|e| EncoderError::Tokenization(e.to_string()))?;

            let specials = self
                .tokenizer
                .get_post_processor()
                .map_or(0, |p| p.added_tokens(false));
            encoding.truncate(max_length.saturating_sub(specials), 0, TruncationDirection::Right);

            let encoding = self
                .tokenizer
                .post_process(encoding, None, true)
                .map_err(|e| EncoderError::Tokenization(e.to_string()))?;

            // Specials are added even when they alone exceed max_length.
            Ok(fit_to_length(
                encoding.get_ids(),
                encoding.get_attention_mask(),
                max_length,
                self.pad_id,
            ))
        }

        fn infer(&self, text: &str, max_length: usize) -> Result<Vec<f32>, EncoderError> {
            use ort::value::TensorRef;

            let (input_ids, attention_mask) = self.tokenize(text, max_length)?;
            let seq_len = input_ids.len();

            let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| EncoderError::Inference(e.to_string()))?;
            let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
                .map_err(|e| EncoderError::Inference(e.to_string()))?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| EncoderError::Inference(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| EncoderError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| EncoderError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor])
                .map_err(|e| EncoderError::Inference(format!("ONNX inference failed: {e}")))?;

            let (shape, output_data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::Inference(format!("Output extraction: {e}")))?;

            // Expected [1, seq_len, dimension]
            if shape.len() != 3 || shape[1] as usize != seq_len {
                return Err(EncoderError::Inference(format!(
                    "Unexpected output shape: {shape:?}, expected [1, {seq_len}, {}]",
                    self.dimension
                )));
            }
            if shape[2] as usize != self.dimension {
                return Err(EncoderError::Dimension {
                    expected: self.dimension,
                    actual: shape[2] as usize,
                });
            }

            // Mean over unmasked tokens.
            let dim = self.dimension;
            let mut pooled = vec![0.0f32; dim];
            let mut mask_sum = 0.0f32;
            for (token_idx, &mask_val) in attention_mask.iter().enumerate() {
                let mask_val = mask_val as f32;
                mask_sum += mask_val;
                let offset = token_idx * dim;
                for (dim_idx, p) in pooled.iter_mut().enumerate() {
                    *p += output_data[offset + dim_idx] * mask_val;
                }
            }

            let denom = mask_sum.max(1e-9);
            for val in &mut pooled {
                *val /= denom;
            }

            Ok(pooled)
        }
    }

    impl VisitEncoder for OnnxVisitEncoder {
        fn encode_text(&self, text: &str, max_length: usize) -> Result<Vec<f32>, EncoderError> {
            self.infer(text, max_length)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxVisitEncoder;

/// Token ids and attention mask cut or right-padded to exactly `max_length`.
#[cfg_attr(not(feature = "onnx-embeddings"), allow(dead_code))]
fn fit_to_length(ids: &[u32], mask: &[u32], max_length: usize, pad_id: u32) -> (Vec<i64>, Vec<i64>) {
    let mut input_ids: Vec<i64> = ids.iter().take(max_length).map(|&id| i64::from(id)).collect();
    let mut attention_mask: Vec<i64> = mask.iter().take(max_length).map(|&m| i64::from(m)).collect();
    input_ids.resize(max_length, i64::from(pad_id));
    attention_mask.resize(max_length, 0);
    (input_ids, attention_mask)
}

/// Deterministic stand-in encoder for tests and smoke runs.
///
/// Truncates to the first `max_length` whitespace tokens, then hashes every
/// byte of what is left into a seed that fills a unit vector.
pub struct MockVisitEncoder {
    dimension: usize,
}

impl MockVisitEncoder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl VisitEncoder for MockVisitEncoder {
    fn encode_text(&self, text: &str, max_length: usize) -> Result<Vec<f32>, EncoderError> {
        let truncated = text
            .split_whitespace()
            .take(max_length)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(deterministic_vector(&truncated, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    // FNV-1a over the whole text, expanded per slot with splitmix64.
    let seed = text
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));

    let mut vec: Vec<f32> = (0..dim as u64)
        .map(|i| {
            let mut z = seed.wrapping_add(i.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15));
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            (z >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
        })
        .collect();

    // L2 normalize
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

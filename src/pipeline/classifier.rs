use ndarray::Array1;

use super::aggregator::Linear;
use super::numeric::softmax;
use super::{ModelError, PredictionError};

/// Linear head over the pooled case representation. The reported
/// probability is the softmax mass of the configured positive class.
#[derive(Debug, Clone)]
pub struct Classifier {
    head: Linear,
    positive_class: usize,
}

impl Classifier {
    pub fn new(head: Linear, positive_class: usize) -> Result<Self, ModelError> {
        if positive_class >= head.out_features() {
            return Err(ModelError::InvalidConfig(format!(
                "positive class {positive_class} out of range for {} classes",
                head.out_features()
            )));
        }
        Ok(Self {
            head,
            positive_class,
        })
    }

    pub fn input_size(&self) -> usize {
        self.head.in_features()
    }

    /// Class probabilities for a pooled representation.
    pub fn class_probabilities(&self, pooled: &Array1<f32>) -> Result<Array1<f32>, PredictionError> {
        if pooled.len() != self.input_size() {
            return Err(PredictionError::InputShape(format!(
                "pooled representation has {} features, classifier expects {}",
                pooled.len(),
                self.input_size()
            )));
        }
        softmax(&self.head.forward_one(pooled.view()), "class probabilities")
    }

    pub fn classify(&self, pooled: &Array1<f32>) -> Result<f32, PredictionError> {
        let probs = self.class_probabilities(pooled)?;
        Ok(probs[self.positive_class])
    }
}

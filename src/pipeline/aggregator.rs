//! Variable-length visit aggregation.
//!
//! The whole case is one sequence of length V (no batching across cases).
//! A bidirectional LSTM produces a `2 * lstm_hidden` state per visit, a
//! two-layer scorer (`linear → tanh → linear`) turns each state into a scalar,
//! and a softmax over the V visits gives the attention weights. The pooled
//! representation is the attention-weighted sum of the visit states.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use super::numeric::{sigmoid, softmax};
use super::{ModelError, PredictionError};

// ═══════════════════════════════════════════════════════════
// Linear
// ═══════════════════════════════════════════════════════════

/// Affine map `y = W x + b` with PyTorch weight layout `[out, in]`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self, ModelError> {
        if bias.len() != weight.nrows() {
            return Err(ModelError::InvalidConfig(format!(
                "linear bias has {} entries for {} outputs",
                bias.len(),
                weight.nrows()
            )));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    /// Apply to every row of `input` (`[rows, in] → [rows, out]`).
    pub fn forward(&self, input: ArrayView2<f32>) -> Array2<f32> {
        input.dot(&self.weight.t()) + &self.bias
    }

    pub fn forward_one(&self, input: ArrayView1<f32>) -> Array1<f32> {
        self.weight.dot(&input) + &self.bias
    }
}

// ═══════════════════════════════════════════════════════════
// LSTM
// ═══════════════════════════════════════════════════════════

/// One direction of one LSTM layer. Gate rows are ordered input, forget,
/// cell, output; `bias` is `bias_ih + bias_hh`.
#[derive(Debug, Clone)]
pub struct LstmCell {
    w_ih: Array2<f32>,
    w_hh: Array2<f32>,
    bias: Array1<f32>,
    hidden: usize,
}

impl LstmCell {
    pub fn new(
        w_ih: Array2<f32>,
        w_hh: Array2<f32>,
        bias_ih: Array1<f32>,
        bias_hh: Array1<f32>,
    ) -> Result<Self, ModelError> {
        let hidden = w_hh.ncols();
        let gates = 4 * hidden;
        if w_ih.nrows() != gates || w_hh.nrows() != gates || bias_ih.len() != gates || bias_hh.len() != gates {
            return Err(ModelError::InvalidConfig(format!(
                "LSTM gate tensors disagree with hidden size {hidden}"
            )));
        }
        Ok(Self {
            w_ih,
            w_hh,
            bias: bias_ih + bias_hh,
            hidden,
        })
    }

    pub fn input_size(&self) -> usize {
        self.w_ih.ncols()
    }

    fn step(&self, x: ArrayView1<f32>, h: &Array1<f32>, c: &Array1<f32>) -> (Array1<f32>, Array1<f32>) {
        let n = self.hidden;
        let gates = self.w_ih.dot(&x) + self.w_hh.dot(h) + &self.bias;

        let input_gate = gates.slice(s![0..n]).mapv(sigmoid);
        let forget_gate = gates.slice(s![n..2 * n]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * n..3 * n]).mapv(f32::tanh);
        let output_gate = gates.slice(s![3 * n..4 * n]).mapv(sigmoid);

        let c_next = &forget_gate * c + &input_gate * &cell_gate;
        let h_next = &output_gate * &c_next.mapv(f32::tanh);
        (h_next, c_next)
    }

    /// Run over all rows of `inputs` from a zero state. Output row `t` is the
    /// hidden state after consuming row `t`, in either direction.
    fn run(&self, inputs: ArrayView2<f32>, reverse: bool) -> Array2<f32> {
        let steps = inputs.nrows();
        let mut out = Array2::zeros((steps, self.hidden));
        let mut h = Array1::zeros(self.hidden);
        let mut c = Array1::zeros(self.hidden);

        for k in 0..steps {
            let t = if reverse { steps - 1 - k } else { k };
            let (h_next, c_next) = self.step(inputs.row(t), &h, &c);
            out.row_mut(t).assign(&h_next);
            h = h_next;
            c = c_next;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct BiLstmLayer {
    forward: LstmCell,
    backward: LstmCell,
}

impl BiLstmLayer {
    pub fn new(forward: LstmCell, backward: LstmCell) -> Result<Self, ModelError> {
        if forward.hidden != backward.hidden || forward.input_size() != backward.input_size() {
            return Err(ModelError::InvalidConfig(
                "forward and reverse LSTM directions have different shapes".into(),
            ));
        }
        Ok(Self { forward, backward })
    }

    /// `[V, in] → [V, 2 * hidden]`, forward state first.
    fn encode(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let n = self.forward.hidden;
        let fwd = self.forward.run(inputs, false);
        let bwd = self.backward.run(inputs, true);

        let mut out = Array2::zeros((inputs.nrows(), 2 * n));
        out.slice_mut(s![.., ..n]).assign(&fwd);
        out.slice_mut(s![.., n..]).assign(&bwd);
        out
    }
}

/// Stacked bidirectional LSTM; each layer consumes the previous layer's
/// concatenated output.
#[derive(Debug, Clone)]
pub struct BiLstm {
    layers: Vec<BiLstmLayer>,
}

impl BiLstm {
    pub fn new(layers: Vec<BiLstmLayer>) -> Result<Self, ModelError> {
        let Some(first) = layers.first() else {
            return Err(ModelError::InvalidConfig("LSTM needs at least one layer".into()));
        };
        let width = 2 * first.forward.hidden;
        if layers[1..]
            .iter()
            .any(|l| l.forward.input_size() != width || l.forward.hidden != first.forward.hidden)
        {
            return Err(ModelError::InvalidConfig(
                "stacked LSTM layers do not chain".into(),
            ));
        }
        Ok(Self { layers })
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].forward.input_size()
    }

    pub fn output_size(&self) -> usize {
        2 * self.layers[0].forward.hidden
    }

    pub fn encode(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current = self.layers[0].encode(inputs);
        for layer in &self.layers[1..] {
            current = layer.encode(current.view());
        }
        current
    }
}

// ═══════════════════════════════════════════════════════════
// Attention pooling
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct AttentionPooling {
    projection: Linear,
    scorer: Linear,
}

impl AttentionPooling {
    pub fn new(projection: Linear, scorer: Linear) -> Result<Self, ModelError> {
        if scorer.in_features() != projection.out_features() || scorer.out_features() != 1 {
            return Err(ModelError::InvalidConfig(
                "attention scorer must map attn_dim to a single score".into(),
            ));
        }
        Ok(Self { projection, scorer })
    }

    /// Raw score per visit.
    pub fn scores(&self, hidden: ArrayView2<f32>) -> Array1<f32> {
        let projected = self.projection.forward(hidden).mapv(f32::tanh);
        self.scorer.forward(projected.view()).column(0).to_owned()
    }

    /// Softmax over visits, then the weighted sum of visit states.
    pub fn pool(&self, hidden: ArrayView2<f32>) -> Result<Aggregation, PredictionError> {
        let attention_weights = softmax(&self.scores(hidden), "attention weights")?;
        let pooled = attention_weights.dot(&hidden);
        Ok(Aggregation {
            pooled,
            attention_weights,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Aggregator
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Aggregation {
    /// `[2 * lstm_hidden]`
    pub pooled: Array1<f32>,
    /// `[V]`, non-negative, sums to 1, aligned with the input visit order.
    pub attention_weights: Array1<f32>,
}

#[derive(Debug, Clone)]
pub struct SequenceAggregator {
    recurrent: BiLstm,
    attention: AttentionPooling,
}

impl SequenceAggregator {
    pub fn new(recurrent: BiLstm, attention: AttentionPooling) -> Result<Self, ModelError> {
        if attention.projection.in_features() != recurrent.output_size() {
            return Err(ModelError::InvalidConfig(format!(
                "attention expects {} features, LSTM produces {}",
                attention.projection.in_features(),
                recurrent.output_size()
            )));
        }
        Ok(Self {
            recurrent,
            attention,
        })
    }

    /// Width of one augmented visit (embedding + temporal features).
    pub fn input_size(&self) -> usize {
        self.recurrent.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.recurrent.output_size()
    }

    /// Per-visit recurrent states `[V, 2 * lstm_hidden]`.
    pub fn encode_sequence(&self, visits: ArrayView2<f32>) -> Array2<f32> {
        self.recurrent.encode(visits)
    }

    pub fn aggregate(&self, visits: ArrayView2<f32>) -> Result<Aggregation, PredictionError> {
        if visits.nrows() == 0 {
            return Err(PredictionError::InputShape("case has no visits".into()));
        }
        if visits.ncols() != self.input_size() {
            return Err(PredictionError::InputShape(format!(
                "augmented visits have {} features, aggregator expects {}",
                visits.ncols(),
                self.input_size()
            )));
        }

        let hidden = self.encode_sequence(visits);
        self.attention.pool(hidden.view())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

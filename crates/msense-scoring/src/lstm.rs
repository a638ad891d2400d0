//! Single-layer LSTM with a linear output head
//!
//! Gate layout follows PyTorch: the `4 * hidden` rows of each weight are
//! the input, forget, cell and output gates, in that order. The initial
//! hidden and cell states are zero.

use crate::artifact::{ArtifactError, StateDict};
use msense_core::{FEATURE_LEN, SCORE_LEN};

const W_IH: &str = "lstm.weight_ih_l0";
const W_HH: &str = "lstm.weight_hh_l0";
const B_IH: &str = "lstm.bias_ih_l0";
const B_HH: &str = "lstm.bias_hh_l0";
const HEAD_W: &str = "linear.weight";
const HEAD_B: &str = "linear.bias";

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq)]
struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    /// `out += self * x`
    fn mul_add(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.cols);
        debug_assert_eq!(out.len(), self.rows);
        for (row, acc) in self.data.chunks_exact(self.cols.max(1)).zip(out.iter_mut()) {
            *acc += row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
        }
    }
}

/// Trained recurrent model
#[derive(Debug, Clone, PartialEq)]
pub struct LstmModel {
    hidden_dim: usize,
    w_ih: Matrix,
    w_hh: Matrix,
    bias: Vec<f64>,
    head_w: Matrix,
    head_b: Vec<f64>,
}

impl LstmModel {
    /// Build from a state dict, inferring dimensions from `lstm.weight_ih_l0`
    ///
    /// # Errors
    /// Missing tensors or inconsistent shapes
    pub fn from_state_dict(dict: &StateDict) -> Result<Self, ArtifactError> {
        let w_ih = dict.matrix(W_IH)?;
        let gate_rows = w_ih.len();
        let input_dim = w_ih.first().map_or(0, Vec::len);
        if gate_rows == 0 || gate_rows % 4 != 0 {
            return Err(ArtifactError::shape(
                W_IH,
                "[4 * hidden, input]",
                vec![gate_rows, input_dim],
            ));
        }
        if input_dim != FEATURE_LEN {
            return Err(ArtifactError::shape(
                W_IH,
                format!("[4 * hidden, {FEATURE_LEN}]"),
                vec![gate_rows, input_dim],
            ));
        }
        let hidden_dim = gate_rows / 4;

        let w_hh = dict.matrix(W_HH)?;
        expect_matrix(W_HH, w_hh, gate_rows, hidden_dim)?;
        let b_ih = dict.vector(B_IH)?;
        expect_vector(B_IH, b_ih, gate_rows)?;
        let b_hh = dict.vector(B_HH)?;
        expect_vector(B_HH, b_hh, gate_rows)?;
        let head_w = dict.matrix(HEAD_W)?;
        expect_matrix(HEAD_W, head_w, SCORE_LEN, hidden_dim)?;
        let head_b = dict.vector(HEAD_B)?;
        expect_vector(HEAD_B, head_b, SCORE_LEN)?;

        tracing::info!(input_dim, hidden_dim, "Detected model dimensions");

        Ok(Self {
            hidden_dim,
            w_ih: Matrix::from_rows(w_ih),
            w_hh: Matrix::from_rows(w_hh),
            bias: b_ih.iter().zip(b_hh).map(|(a, b)| a + b).collect(),
            head_w: Matrix::from_rows(head_w),
            head_b: head_b.to_vec(),
        })
    }

    #[inline]
    #[must_use]
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Run the sequence and project the last hidden state
    ///
    /// Returns the raw head output, before any squashing.
    #[must_use]
    pub fn forward(&self, sequence: &[[f64; FEATURE_LEN]]) -> [f64; SCORE_LEN] {
        let h_dim = self.hidden_dim;
        let mut h = vec![0.0; h_dim];
        let mut c = vec![0.0; h_dim];
        let mut gates = vec![0.0; 4 * h_dim];

        for x in sequence {
            gates.copy_from_slice(&self.bias);
            self.w_ih.mul_add(x, &mut gates);
            self.w_hh.mul_add(&h, &mut gates);

            for j in 0..h_dim {
                let input = sigmoid(gates[j]);
                let forget = sigmoid(gates[h_dim + j]);
                let cell = gates[2 * h_dim + j].tanh();
                let output = sigmoid(gates[3 * h_dim + j]);
                c[j] = forget * c[j] + input * cell;
                h[j] = output * c[j].tanh();
            }
        }

        let mut out = [0.0; SCORE_LEN];
        out.copy_from_slice(&self.head_b);
        self.head_w.mul_add(&h, &mut out);
        out
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn expect_matrix(name: &str, rows: &[Vec<f64>], r: usize, c: usize) -> Result<(), ArtifactError> {
    let actual = vec![rows.len(), rows.first().map_or(0, Vec::len)];
    if actual != [r, c] {
        return Err(ArtifactError::shape(name, format!("[{r}, {c}]"), actual));
    }
    Ok(())
}

fn expect_vector(name: &str, v: &[f64], len: usize) -> Result<(), ArtifactError> {
    if v.len() != len {
        return Err(ArtifactError::shape(name, format!("[{len}]"), vec![v.len()]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Tensor;
    use std::collections::BTreeMap;

    fn tensors(hidden: usize, head_name: &str) -> BTreeMap<String, Tensor> {
        let gates = 4 * hidden;
        let mut t = BTreeMap::new();
        t.insert(W_IH.to_string(), Tensor::Matrix(vec![vec![0.0; FEATURE_LEN]; gates]));
        t.insert(W_HH.to_string(), Tensor::Matrix(vec![vec![0.0; hidden]; gates]));
        t.insert(B_IH.to_string(), Tensor::Vector(vec![0.0; gates]));
        t.insert(B_HH.to_string(), Tensor::Vector(vec![0.0; gates]));
        t.insert(format!("{head_name}.weight"), Tensor::Matrix(vec![vec![0.0; hidden]; SCORE_LEN]));
        t.insert(format!("{head_name}.bias"), Tensor::Vector(vec![0.5, -0.5, 0.0]));
        t
    }

    fn dict(hidden: usize, head_name: &str) -> StateDict {
        StateDict::from_tensors(tensors(hidden, head_name))
    }

    #[test]
    fn infers_hidden_dim() {
        let model = LstmModel::from_state_dict(&dict(32, "linear")).unwrap();
        assert_eq!(model.hidden_dim(), 32);
    }

    #[test]
    fn accepts_fc_head() {
        assert!(LstmModel::from_state_dict(&dict(4, "fc")).is_ok());
    }

    #[test]
    fn zero_weights_return_head_bias() {
        let model = LstmModel::from_state_dict(&dict(2, "linear")).unwrap();
        assert_eq!(model.forward(&[[1.0; FEATURE_LEN]]), [0.5, -0.5, 0.0]);
    }

    #[test]
    fn rejects_wrong_input_width() {
        let mut t = BTreeMap::new();
        t.insert(W_IH.to_string(), Tensor::Matrix(vec![vec![0.0; 3]; 8]));
        let err = LstmModel::from_state_dict(&StateDict::from_tensors(t)).unwrap_err();
        assert!(matches!(err, ArtifactError::Shape { ref tensor, .. } if tensor == W_IH));
    }

    #[test]
    fn rejects_mismatched_recurrent_weights() {
        let mut t = tensors(2, "linear");
        t.insert(W_HH.to_string(), Tensor::Matrix(vec![vec![0.0; 3]; 8]));
        let err = LstmModel::from_state_dict(&StateDict::from_tensors(t)).unwrap_err();
        assert!(matches!(err, ArtifactError::Shape { ref tensor, .. } if tensor == W_HH));
    }

    #[test]
    fn rejects_head_with_wrong_output_count() {
        let mut t = tensors(2, "linear");
        t.insert(HEAD_B.to_string(), Tensor::Vector(vec![0.0; 4]));
        let err = LstmModel::from_state_dict(&StateDict::from_tensors(t)).unwrap_err();
        assert!(matches!(err, ArtifactError::Shape { ref tensor, .. } if tensor == HEAD_B));
    }

    #[test]
    fn sigmoid_midpoint() {
        assert_eq!(sigmoid(0.0), 0.5);
    }
}

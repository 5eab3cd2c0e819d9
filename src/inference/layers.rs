//! NN kernels. Every kernel works on `rows` row-major samples at once.

use serde::{Deserialize, Serialize};

use crate::core::error::VpuError;

/// Layer description as stored in the model metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense,
    Relu,
    Sigmoid,
    L2Norm,
    Knn { n_neighbors: usize },
}

/// Fully connected layer, `act · W + b` with `W` stored `[in][out]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    in_features: usize,
    out_features: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Dense {
    pub fn new(
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Option<Vec<f32>>,
    ) -> Result<Self, VpuError> {
        if weight.len() != in_features * out_features {
            return Err(VpuError::Model(format!(
                "dense weight has {} values, expected {}x{}",
                weight.len(),
                in_features,
                out_features
            )));
        }
        let bias = bias.unwrap_or_else(|| vec![0.0; out_features]);
        if bias.len() != out_features {
            return Err(VpuError::Model(format!("dense bias has {} values, expected {}", bias.len(), out_features)));
        }
        Ok(Self { in_features, out_features, weight, bias })
    }

    fn forward(&self, input: &[f32], rows: usize, out: &mut [f32]) {
        let (n_in, n_out) = (self.in_features, self.out_features);
        for r in 0..rows {
            let x = &input[r * n_in..(r + 1) * n_in];
            let y = &mut out[r * n_out..(r + 1) * n_out];
            y.copy_from_slice(&self.bias);
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let w_row = &self.weight[i * n_out..(i + 1) * n_out];
                for (yj, &wij) in y.iter_mut().zip(w_row) {
                    *yj += xi * wij;
                }
            }
        }
    }
}

/// Distance-weighted nearest-neighbour regression over stored reference points.
#[derive(Debug, Clone, PartialEq)]
pub struct Knn {
    in_features: usize,
    n_points: usize,
    n_neighbors: usize,
    /// `[in][n_points]`
    weight: Vec<f32>,
    target: Vec<f32>,
}

const KNN_EPSILON: f32 = 1e-12;

impl Knn {
    pub fn new(
        in_features: usize,
        n_points: usize,
        n_neighbors: usize,
        weight: Vec<f32>,
        target: Vec<f32>,
    ) -> Result<Self, VpuError> {
        if weight.len() != in_features * n_points || target.len() != n_points {
            return Err(VpuError::Model(format!(
                "knn expects weight {}x{} and {} targets, got {} and {}",
                in_features,
                n_points,
                n_points,
                weight.len(),
                target.len()
            )));
        }
        if n_neighbors == 0 || n_neighbors > n_points {
            return Err(VpuError::Model(format!("knn n_neighbors {} outside [1, {}]", n_neighbors, n_points)));
        }
        Ok(Self { in_features, n_points, n_neighbors, weight, target })
    }

    fn forward(&self, input: &[f32], rows: usize, out: &mut [f32]) {
        let mut distances = vec![0.0f32; self.n_points];
        let mut order: Vec<usize> = Vec::with_capacity(self.n_points);
        for r in 0..rows {
            let x = &input[r * self.in_features..(r + 1) * self.in_features];
            distances.fill(1.0);
            for (i, &xi) in x.iter().enumerate() {
                let w_row = &self.weight[i * self.n_points..(i + 1) * self.n_points];
                for (d, &w) in distances.iter_mut().zip(w_row) {
                    *d -= xi * w;
                }
            }

            order.clear();
            order.extend(0..self.n_points);
            // stable: equal distances keep reference order
            order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));

            let (mut num, mut den) = (0.0f32, 0.0f32);
            for &j in &order[..self.n_neighbors] {
                let inv = 1.0 / (distances[j] + KNN_EPSILON);
                num += self.target[j] * inv;
                den += inv;
            }
            out[r] = num / den;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Dense(Dense),
    Relu,
    Sigmoid,
    L2Norm,
    Knn(Knn),
}

impl Layer {
    pub fn output_width(&self, input_width: usize) -> usize {
        match self {
            Layer::Dense(d) => d.out_features,
            Layer::Knn(_) => 1,
            Layer::Relu | Layer::Sigmoid | Layer::L2Norm => input_width,
        }
    }

    /// Width this layer requires on its input, `None` when any width works.
    pub fn input_width(&self) -> Option<usize> {
        match self {
            Layer::Dense(d) => Some(d.in_features),
            Layer::Knn(k) => Some(k.in_features),
            _ => None,
        }
    }

    pub fn forward(&self, input: &[f32], rows: usize, width: usize, out: &mut [f32]) {
        match self {
            Layer::Dense(d) => d.forward(input, rows, out),
            Layer::Knn(k) => k.forward(input, rows, out),
            Layer::Relu => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = x.max(0.0);
                }
            }
            Layer::Sigmoid => {
                for (o, &x) in out.iter_mut().zip(input) {
                    *o = 1.0 / (1.0 + (-x).exp());
                }
            }
            Layer::L2Norm => {
                for r in 0..rows {
                    let x = &input[r * width..(r + 1) * width];
                    let y = &mut out[r * width..(r + 1) * width];
                    let norm = x.iter().map(|v| v * v).sum::<f32>().sqrt();
                    if norm > 0.0 {
                        for (o, &v) in y.iter_mut().zip(x) {
                            *o = v / norm;
                        }
                    } else {
                        y.copy_from_slice(x);
                    }
                }
            }
        }
    }
}

//! 8-bit scalar quantization.
//!
//! Each dimension is mapped linearly from its trained `[min, max]` range to
//! `[0, 255]`. Values outside the trained range clamp to the ends. The
//! parameters are per dimension, so one codebook serves every vector.

use serde::{Deserialize, Serialize};

/// Per-dimension min/scale codebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarQuantizer {
    mins: Vec<f32>,
    /// `(max - min) / 255`, zero for constant dimensions.
    scales: Vec<f32>,
}

impl ScalarQuantizer {
    /// Learn value ranges from `data` (`rows x dim`, row-major).
    pub fn train(data: &[f32], dim: usize) -> Self {
        let mut mins = vec![f32::MAX; dim];
        let mut maxs = vec![f32::MIN; dim];
        for row in data.chunks_exact(dim) {
            for (d, &v) in row.iter().enumerate() {
                if v < mins[d] {
                    mins[d] = v;
                }
                if v > maxs[d] {
                    maxs[d] = v;
                }
            }
        }

        let scales = mins
            .iter_mut()
            .zip(&maxs)
            .map(|(min, &max)| {
                if *min > max {
                    // No training rows
                    *min = 0.0;
                    return 0.0;
                }
                let range = max - *min;
                if range < f32::EPSILON {
                    0.0
                } else {
                    range / 255.0
                }
            })
            .collect();

        Self { mins, scales }
    }

    pub fn dim(&self) -> usize {
        self.mins.len()
    }

    /// Bytes per encoded vector.
    pub fn code_size(&self) -> usize {
        self.mins.len()
    }

    /// Append the code of `vector` to `out`.
    pub fn encode_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        debug_assert_eq!(vector.len(), self.dim());
        out.extend(vector.iter().zip(self.mins.iter().zip(&self.scales)).map(
            |(&v, (&min, &scale))| {
                if scale == 0.0 {
                    0
                } else {
                    ((v - min) / scale).round().clamp(0.0, 255.0) as u8
                }
            },
        ));
    }

    /// Reconstruct `code` into `out`. Lossy.
    pub fn decode_into(&self, code: &[u8], out: &mut [f32]) {
        debug_assert_eq!(code.len(), self.dim());
        for (((o, &c), &min), &scale) in out.iter_mut().zip(code).zip(&self.mins).zip(&self.scales) {
            *o = min + f32::from(c) * scale;
        }
    }
}

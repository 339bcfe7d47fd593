use crate::error::{AnalysisError, Result};

pub const N_CHROMA: usize = 12;
pub const N_TIMBRAL: usize = 13;
pub const N_SPECTRAL: usize = 4;
pub const N_RHYTHM: usize = 32;

/// Row-major feature matrix indexed `[row][frame]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: Vec<Vec<f32>>,
    cols: usize,
}

impl Matrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            rows: vec![vec![0.0; n_cols]; n_rows],
            cols: n_cols,
        }
    }

    #[cfg(test)]
    pub fn filled(n_rows: usize, n_cols: usize, value: f32) -> Self {
        Self {
            rows: vec![vec![value; n_cols]; n_rows],
            cols: n_cols,
        }
    }

    /// Build from per-row vectors. Rows must all have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        debug_assert!(rows.iter().all(|r| r.len() == cols));
        Self { rows, cols }
    }

    /// Build from per-frame column vectors of `n_rows` values each.
    pub fn from_columns(columns: &[Vec<f32>], n_rows: usize) -> Self {
        let mut rows = vec![Vec::with_capacity(columns.len()); n_rows];
        for column in columns {
            for (r, row) in rows.iter_mut().enumerate() {
                row.push(column.get(r).copied().unwrap_or(0.0));
            }
        }
        Self {
            rows,
            cols: columns.len(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.rows[r]
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.rows[r][c]
    }

    pub fn column(&self, c: usize) -> Vec<f32> {
        self.rows.iter().map(|row| row[c]).collect()
    }

    /// Per-row mean over the column range `[start, end)`.
    pub fn row_means(&self, start: usize, end: usize) -> Vec<f32> {
        let end = end.min(self.cols);
        if start >= end {
            return vec![0.0; self.n_rows()];
        }
        let n = (end - start) as f32;
        self.rows
            .iter()
            .map(|row| row[start..end].iter().sum::<f32>() / n)
            .collect()
    }

    /// Columns `[start, end)` as a new matrix.
    pub fn slice_columns(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.cols);
        let start = start.min(end);
        Matrix {
            rows: self.rows.iter().map(|row| row[start..end].to_vec()).collect(),
            cols: end - start,
        }
    }
}

/// Time-aligned feature matrices for one analysis run.
///
/// Every matrix has `frame_times.len()` columns; `FeatureSet::new` refuses
/// anything else.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    pub chroma: Matrix,
    pub timbral: Matrix,
    /// centroid, rolloff, bandwidth, zero-crossing rate
    pub spectral: Matrix,
    pub energy: Matrix,
    pub rhythm: Matrix,
    pub frame_times: Vec<f32>,
    pub tempo_bpm: f32,
    pub beat_times: Vec<f32>,
    pub beat_synchronous: bool,
}

impl FeatureSet {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chroma: Matrix,
        timbral: Matrix,
        spectral: Matrix,
        energy: Matrix,
        rhythm: Matrix,
        frame_times: Vec<f32>,
        tempo_bpm: f32,
        beat_times: Vec<f32>,
        beat_synchronous: bool,
    ) -> Result<Self> {
        let expected = frame_times.len();
        let families: [(&'static str, &Matrix, usize); 5] = [
            ("chroma", &chroma, N_CHROMA),
            ("timbral", &timbral, N_TIMBRAL),
            ("spectral", &spectral, N_SPECTRAL),
            ("energy", &energy, 1),
            ("rhythm", &rhythm, N_RHYTHM),
        ];
        for (family, matrix, n_rows) in families {
            if matrix.n_cols() != expected {
                return Err(AnalysisError::FrameMismatch {
                    family,
                    expected,
                    found: matrix.n_cols(),
                });
            }
            debug_assert_eq!(matrix.n_rows(), n_rows, "{} row count", family);
        }

        Ok(Self {
            chroma,
            timbral,
            spectral,
            energy,
            rhythm,
            frame_times,
            tempo_bpm,
            beat_times,
            beat_synchronous,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.frame_times.len()
    }
}

//! Validated model input

use ndarray::{Array2, ArrayView1};

/// Row-major `(rows, features)` model input. Only the validator builds these,
/// so every value is finite and the width matches the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Array2<f32>,
}

impl FeatureMatrix {
    /// Wrap an already-validated array.
    pub(crate) fn from_array(values: Array2<f32>) -> Self {
        Self { values }
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.row(index)
    }

    /// Shape and flat row-major data, as ONNX Runtime takes them
    pub fn to_tensor_parts(&self) -> (Vec<i64>, Vec<f32>) {
        let shape = vec![self.rows() as i64, self.cols() as i64];
        (shape, self.values.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tensor_parts_are_row_major() {
        let matrix = FeatureMatrix::from_array(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let (shape, data) = matrix.to_tensor_parts();

        assert_eq!(shape, vec![2, 3]);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(matrix.row(1)[0], 4.0);
    }
}

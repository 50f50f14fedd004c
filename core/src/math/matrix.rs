use ndarray::Array2;

pub struct MatrixHelper;

impl MatrixHelper {
    /// Row-major to column-major. Short rows are padded with `T::default()`
    /// up to the longest row.
    pub fn transpose<T: Clone + Default>(rows: &[Vec<T>]) -> Vec<Vec<T>> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Vec::new();
        }
        let padded = Array2::from_shape_fn((rows.len(), width), |(r, c)| {
            rows[r].get(c).cloned().unwrap_or_default()
        });
        padded
            .reversed_axes()
            .outer_iter()
            .map(|column| column.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_pads_ragged_rows() {
        let out = MatrixHelper::transpose(&[vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(out, vec![vec![1, 4], vec![2, 5], vec![3, 0]]);
    }

    #[test]
    fn transpose_of_empty_matrix_is_empty() {
        let rows: Vec<Vec<f64>> = Vec::new();
        assert!(MatrixHelper::transpose(&rows).is_empty());
    }
}

//! Feature-tensor reshaping and the label grid.
//!
//! The backbone emits one feature vector per spatial location as a
//! (C, Hf, Wf) tensor. Downstream clustering wants a (N, C) matrix with
//! N = Hf·Wf. Row n of the matrix corresponds to location (n / Wf, n % Wf),
//! raster order over the feature grid. Reshaping label
//! predictions back to (Hf, Wf) uses the identical order; this pairing is the
//! invariant that keeps the overlay pixel-aligned with the source image.

use ndarray::{Array2, Array3};

use crate::error::{PatchsegError, Result};

/// Flatten a (C, Hf, Wf) feature tensor into the (N, C) matrix consumed by
/// the cluster model. Raster order over (row, col).
pub fn flatten_features(tensor: &Array3<f32>) -> Array2<f32> {
    let (c, hf, wf) = tensor.dim();
    Array2::from_shape_fn((hf * wf, c), |(n, ch)| tensor[[ch, n / wf, n % wf]])
}

/// Reshape a flat label vector back onto the (Hf, Wf) grid, raster order.
pub fn label_grid(labels: &[usize], hf: usize, wf: usize) -> Result<Array2<usize>> {
    if labels.len() != hf * wf {
        return Err(PatchsegError::InvalidInput(format!(
            "label count {} does not cover a {}x{} grid",
            labels.len(),
            hf,
            wf
        )));
    }
    Ok(Array2::from_shape_fn((hf, wf), |(r, c)| labels[r * wf + c]))
}

/// Calculates the strides for a given shape.
/// Strides represent the number of elements to skip in the flattened data array
/// to move one step along each dimension.
///
/// Example:
/// shape = [2, 3] -> strides = [3, 1]
/// shape = [2, 2, 2] -> strides = [4, 2, 1]
pub fn calculate_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return vec![];
    }
    let rank = shape.len();
    let mut strides = vec![1; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Returns the buffer offset of every element of a strided layout, visiting
/// the elements in logical row-major order.
pub fn logical_offsets(shape: &[usize], strides: &[usize], offset: usize) -> Vec<usize> {
    let numel: usize = shape.iter().product();
    let mut offsets = Vec::with_capacity(numel);
    if numel == 0 {
        return offsets;
    }
    let rank = shape.len();
    let mut coords = vec![0usize; rank];
    for _ in 0..numel {
        let off = coords
            .iter()
            .zip(strides)
            .fold(offset, |acc, (c, s)| acc + c * s);
        offsets.push(off);
        // Odometer increment, last dimension fastest.
        for dim in (0..rank).rev() {
            coords[dim] += 1;
            if coords[dim] < shape[dim] {
                break;
            }
            coords[dim] = 0;
        }
    }
    offsets
}

/// Largest buffer index a strided layout can touch, or `None` when empty.
pub(crate) fn max_reachable_index(shape: &[usize], strides: &[usize], offset: usize) -> Option<usize> {
    if shape.iter().any(|&d| d == 0) {
        return None;
    }
    Some(
        shape
            .iter()
            .zip(strides)
            .fold(offset, |acc, (d, s)| acc + (d - 1) * s),
    )
}

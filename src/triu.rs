//! Triangular packing of symmetric covariance tensors.
//!
//! A symmetric N×N matrix stored along two axes of an array is collapsed into
//! a single axis of length N(N+1)/2 holding the upper triangle in
//! diagonal-major order (ascending diagonal bands, matching the healpy
//! new-ordering spectrum convention), and expanded back exactly.

use ndarray::{ArrayD, Axis, IxDyn};

use crate::error::{Error, Result};
use crate::reshape::{flatten_axes, unflatten_axes};

/// N(N+1)/2.
pub fn triangular(n: usize) -> usize {
    n * (n + 1) / 2
}

fn isqrt(v: u64) -> u64 {
    if v == 0 {
        return 0;
    }
    let mut x = (v as f64).sqrt() as u64;
    while x.checked_mul(x).map_or(true, |s| s > v) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).map_or(false, |s| s <= v) {
        x += 1;
    }
    x
}

/// Recover N from t = N(N+1)/2, exactly in integer arithmetic.
///
/// Returns `None` when `t` is not a triangular number. The quadratic is
/// solved with an integer square root and verified, so there is no
/// floating-point rounding failure at large N.
pub fn triangular_side(t: usize) -> Option<usize> {
    let disc = 8u64.checked_mul(t as u64)?.checked_add(1)?;
    let n = ((isqrt(disc) - 1) / 2) as usize;
    (triangular(n) == t).then_some(n)
}

/// Upper-triangular index pairs of an N×N matrix in diagonal-major order.
///
/// Walks k = 0..N(N+1)/2 with a row offset and a column offset: row = k −
/// rowOffset, col = row + colOffset; when col hits the last column the walk
/// restarts on the next diagonal band. For N = 3 this yields
/// (0,0),(1,1),(2,2),(0,1),(1,2),(0,2).
pub fn triu_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    let count = triangular(n);
    let mut rows = Vec::with_capacity(count);
    let mut cols = Vec::with_capacity(count);
    let mut row_offset = 0;
    let mut col_offset = 0;
    for k in 0..count {
        let row = k - row_offset;
        let col = row + col_offset;
        rows.push(row);
        cols.push(col);
        if col == n - 1 {
            row_offset = k + 1;
            col_offset += 1;
        }
    }
    (rows, cols)
}

/// Diagonal-major upper-triangular positions linearized as `i*n + j`.
pub fn triu_indices_flat(n: usize) -> Vec<usize> {
    let (rows, cols) = triu_indices(n);
    rows.iter().zip(&cols).map(|(&i, &j)| i * n + j).collect()
}

/// The (row, col) pair at position `k` of the diagonal-major enumeration.
pub fn triu_pos(k: usize, n: usize) -> Result<(usize, usize)> {
    let count = triangular(n);
    if k >= count {
        return Err(Error::Validation(format!(
            "position {k} out of range for the {count} upper-triangular entries of a {n}x{n} matrix"
        )));
    }
    let (rows, cols) = triu_indices(n);
    Ok((rows[k], cols[k]))
}

fn matrix_axes(ndim: usize, axis1: usize, axis2: usize) -> Result<(usize, usize)> {
    if axis1 >= ndim || axis2 >= ndim {
        return Err(Error::Shape(format!(
            "matrix axes ({axis1}, {axis2}) out of range for rank {ndim}"
        )));
    }
    if axis1 == axis2 {
        return Err(Error::Shape(format!(
            "matrix axes must be distinct, got {axis1} twice"
        )));
    }
    Ok(if axis1 < axis2 {
        (axis1, axis2)
    } else {
        (axis2, axis1)
    })
}

/// Copy every (i, j) slice with i < j onto the (j, i) slice, in place.
///
/// The diagonal is untouched. This is the only in-place mutation in the
/// packing component.
pub fn symmetrize<A: Clone>(arr: &mut ArrayD<A>, axis1: usize, axis2: usize) -> Result<()> {
    let (a1, a2) = matrix_axes(arr.ndim(), axis1, axis2)?;
    let n = arr.shape()[a1];
    if arr.shape()[a2] != n {
        return Err(Error::Validation(format!(
            "matrix axes must have equal extents, got {} and {}",
            arr.shape()[a1],
            arr.shape()[a2]
        )));
    }
    for i in 0..n {
        for j in i + 1..n {
            // After removing a1, axis a2 shifts down by one.
            let src = arr
                .index_axis(Axis(a1), i)
                .index_axis(Axis(a2 - 1), j)
                .to_owned();
            arr.index_axis_mut(Axis(a1), j)
                .index_axis_mut(Axis(a2 - 1), i)
                .assign(&src);
        }
    }
    Ok(())
}

/// Copying variant of [`symmetrize`].
pub fn symmetrized<A: Clone>(arr: &ArrayD<A>, axis1: usize, axis2: usize) -> Result<ArrayD<A>> {
    let mut out = arr.clone();
    symmetrize(&mut out, axis1, axis2)?;
    Ok(out)
}

/// Pack the symmetric matrix held on (`axis1`, `axis2`) into a single axis of
/// length N(N+1)/2 at `flat_axis`, in diagonal-major order.
///
/// Only the upper triangle is read; the lower triangle is ignored, so the
/// input need not actually be symmetric.
pub fn pack_triu<A: Clone>(
    arr: &ArrayD<A>,
    axis1: usize,
    axis2: usize,
    flat_axis: usize,
) -> Result<ArrayD<A>> {
    let ndim = arr.ndim();
    let (a1, a2) = matrix_axes(ndim, axis1, axis2)?;
    let n = arr.shape()[a1];
    if arr.shape()[a2] != n {
        return Err(Error::Validation(format!(
            "matrix axes must have equal extents, got {} and {}",
            arr.shape()[a1],
            arr.shape()[a2]
        )));
    }
    if flat_axis >= ndim - 1 {
        return Err(Error::Shape(format!(
            "flat axis {flat_axis} out of range for packed rank {}",
            ndim - 1
        )));
    }
    let flat = flatten_axes(arr, &[a1, a2], flat_axis)?;
    Ok(flat.select(Axis(flat_axis), &triu_indices_flat(n)))
}

/// Expand a diagonal-major packed axis back into a full symmetric matrix on
/// (`axis1`, `axis2`).
///
/// The packed extent must be an exact triangular number; N is recovered in
/// integer arithmetic. The lower triangle is filled by symmetrization.
pub fn unpack_triu<A: Clone + Default>(
    arr: &ArrayD<A>,
    axis1: usize,
    axis2: usize,
    flat_axis: usize,
) -> Result<ArrayD<A>> {
    let ndim = arr.ndim();
    if flat_axis >= ndim {
        return Err(Error::Shape(format!(
            "flat axis {flat_axis} out of range for rank {ndim}"
        )));
    }
    let (a1, a2) = matrix_axes(ndim + 1, axis1, axis2)?;
    let t = arr.shape()[flat_axis];
    let n = triangular_side(t).ok_or_else(|| {
        Error::Validation(format!(
            "packed length {t} along axis {flat_axis} is not a triangular number"
        ))
    })?;

    // Scatter the packed entries into an n*n axis, zero elsewhere.
    let mut shape = arr.shape().to_vec();
    shape[flat_axis] = n * n;
    let mut full = ArrayD::from_elem(IxDyn(&shape), A::default());
    for (k, &dst) in triu_indices_flat(n).iter().enumerate() {
        full.index_axis_mut(Axis(flat_axis), dst)
            .assign(&arr.index_axis(Axis(flat_axis), k));
    }

    let mut out = unflatten_axes(&full, &[n, n], &[a1, a2], flat_axis)?;
    symmetrize(&mut out, a1, a2)?;
    Ok(out)
}

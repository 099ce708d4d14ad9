//! Generalized flatten/unflatten of arbitrary axis subsets.
//!
//! These helpers let every other kernel treat "bring these axes together,
//! collapse them, and put the collapsed axis here" as a single call with an
//! exact inverse. No axis order is assumed beyond the axes explicitly passed
//! in; the collapse order is the order the axes are listed.

use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};

fn check_axes(ndim: usize, axes: &[usize]) -> Result<()> {
    if axes.is_empty() {
        return Err(Error::Shape("axis list must not be empty".into()));
    }
    for (k, &a) in axes.iter().enumerate() {
        if a >= ndim {
            return Err(Error::Shape(format!(
                "axis {a} out of range for rank {ndim}"
            )));
        }
        if axes[..k].contains(&a) {
            return Err(Error::Shape(format!("duplicate axis {a}")));
        }
    }
    Ok(())
}

/// Reorder axes so that output axis `i` is input axis `perm[i]`, materializing
/// a standard-layout copy so a plain reshape is valid afterwards.
fn permute_owned<A: Clone>(arr: &ArrayD<A>, perm: &[usize]) -> Result<ArrayD<A>> {
    let view = arr.view().permuted_axes(IxDyn(perm));
    let shape: Vec<usize> = view.shape().to_vec();
    let data: Vec<A> = view.iter().cloned().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| Error::Shape(e.to_string()))
}

/// Collapse the listed axes (in the listed order) into a single axis placed at
/// `pos` in the result.
///
/// The result has rank `arr.ndim() - axes.len() + 1`; the remaining axes keep
/// their original relative order. Exact inverse: [`unflatten_axes`] with the
/// original extents of `axes`.
pub fn flatten_axes<A: Clone>(arr: &ArrayD<A>, axes: &[usize], pos: usize) -> Result<ArrayD<A>> {
    let ndim = arr.ndim();
    check_axes(ndim, axes)?;
    let out_rank = ndim - axes.len() + 1;
    if pos >= out_rank {
        return Err(Error::Shape(format!(
            "target position {pos} out of range for flattened rank {out_rank}"
        )));
    }

    // Listed axes to the front, the rest in original order.
    let mut perm: Vec<usize> = axes.to_vec();
    perm.extend((0..ndim).filter(|a| !axes.contains(a)));
    let moved = permute_owned(arr, &perm)?;

    let collapsed: usize = axes.iter().map(|&a| arr.shape()[a]).product();
    let mut shape = vec![collapsed];
    shape.extend_from_slice(&moved.shape()[axes.len()..]);
    let flat = moved
        .into_shape_with_order(IxDyn(&shape))
        .map_err(|e| Error::Shape(e.to_string()))?;

    if pos == 0 {
        return Ok(flat);
    }
    // Move the collapsed front axis to `pos`.
    let mut perm2: Vec<usize> = Vec::with_capacity(out_rank);
    perm2.extend(1..=pos);
    perm2.push(0);
    perm2.extend(pos + 1..out_rank);
    permute_owned(&flat, &perm2)
}

/// Expand the axis at `pos` back into the axes it was collapsed from.
///
/// `shape` gives the extents of the restored axes, either directly (one entry
/// per restored axis, in the order `axes` are listed) or as the full restored
/// shape (extents are read off at the `axes` positions). Restored axis `i`
/// lands at position `axes[i]` of the result.
pub fn unflatten_axes<A: Clone>(
    arr: &ArrayD<A>,
    shape: &[usize],
    axes: &[usize],
    pos: usize,
) -> Result<ArrayD<A>> {
    let ndim = arr.ndim();
    if pos >= ndim {
        return Err(Error::Shape(format!(
            "position {pos} out of range for rank {ndim}"
        )));
    }
    let out_rank = ndim - 1 + axes.len();
    check_axes(out_rank, axes)?;

    let extents: Vec<usize> = if shape.len() == axes.len() {
        shape.to_vec()
    } else if shape.len() == out_rank {
        axes.iter().map(|&a| shape[a]).collect()
    } else {
        return Err(Error::Shape(format!(
            "shape length {} matches neither the axis count {} nor the restored rank {}",
            shape.len(),
            axes.len(),
            out_rank
        )));
    };
    let flat_len = arr.shape()[pos];
    if extents.iter().product::<usize>() != flat_len {
        return Err(Error::Shape(format!(
            "restored extents {extents:?} do not multiply to the flattened length {flat_len}"
        )));
    }

    // Flattened axis to the front, expand, then scatter the restored axes.
    let mut perm: Vec<usize> = vec![pos];
    perm.extend((0..ndim).filter(|&a| a != pos));
    let moved = permute_owned(arr, &perm)?;

    let mut newshape = extents.clone();
    newshape.extend_from_slice(&moved.shape()[1..]);
    let expanded = moved
        .into_shape_with_order(IxDyn(&newshape))
        .map_err(|e| Error::Shape(e.to_string()))?;

    let k = axes.len();
    let mut perm_out = vec![usize::MAX; out_rank];
    for (i, &a) in axes.iter().enumerate() {
        perm_out[a] = i;
    }
    let mut next = k;
    for slot in perm_out.iter_mut() {
        if *slot == usize::MAX {
            *slot = next;
            next += 1;
        }
    }
    permute_owned(&expanded, &perm_out)
}

/// Promote `arr` to rank `n` by inserting singleton axes.
///
/// With `insert_axes == None` the array is left-padded. Otherwise singletons
/// are inserted at the listed positions (positions refer to the promoted
/// array) and any remaining deficit is still left-padded. An array already at
/// rank `n` or deeper is returned unchanged.
pub fn atleast_nd<A: Clone>(
    arr: &ArrayD<A>,
    n: usize,
    insert_axes: Option<&[usize]>,
) -> Result<ArrayD<A>> {
    let ndim = arr.ndim();
    if ndim >= n {
        return Ok(arr.clone());
    }
    let deficit = n - ndim;
    let positions: Vec<usize> = match insert_axes {
        None => (0..deficit).collect(),
        Some(list) => {
            if list.len() > deficit {
                return Err(Error::Shape(format!(
                    "{} insertion axes exceed the rank deficit {deficit}",
                    list.len()
                )));
            }
            let mut p: Vec<usize> = (0..deficit - list.len()).collect();
            p.extend_from_slice(list);
            p
        }
    };

    let mut singleton = vec![false; n];
    for &p in &positions {
        if p >= n {
            return Err(Error::Shape(format!(
                "insertion axis {p} out of range for rank {n}"
            )));
        }
        if singleton[p] {
            return Err(Error::Shape(format!("duplicate insertion axis {p}")));
        }
        singleton[p] = true;
    }

    let mut shape = Vec::with_capacity(n);
    let mut src = arr.shape().iter();
    for &is_new in &singleton {
        if is_new {
            shape.push(1);
        } else {
            // Exactly `ndim` slots remain non-singleton by construction.
            shape.push(*src.next().ok_or_else(|| {
                Error::Shape("insertion axes leave no room for existing axes".into())
            })?);
        }
    }

    let data: Vec<A> = arr.iter().cloned().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| Error::Shape(e.to_string()))
}

//! Radial binning of 2D fields into arbitrary, non-uniform bins.
//!
//! Used to reduce 2D Fourier-space power to 1D isotropic spectra, but generic
//! over any scalar field with a matching per-pixel radius map.

use ndarray::{Array2, ArrayD, IxDyn};

use crate::error::{Error, Result};

/// Per-pixel weights for [`radial_bin`].
pub enum RadialWeights {
    /// Unit weight for every pixel.
    Unit,
    /// A weight map broadcastable against the field (trailing-axes aligned).
    Map(ArrayD<f64>),
    /// A function of the radius map, evaluated once before binning.
    OfRadius(Box<dyn Fn(&Array2<f64>) -> Array2<f64>>),
}

fn check_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!(
            "need at least 2 bin edges, got {}",
            edges.len()
        )));
    }
    if edges[0] < 0.0 {
        return Err(Error::Validation(format!(
            "bin edges must be non-negative, first edge is {}",
            edges[0]
        )));
    }
    for w in edges.windows(2) {
        if !(w[1] > w[0]) {
            return Err(Error::Validation(format!(
                "bin edges must be strictly increasing, got {} then {}",
                w[0], w[1]
            )));
        }
    }
    Ok(())
}

/// Weighted radial mean of `field` per bin.
///
/// `field` may carry any number of leading batch axes; its trailing two axes
/// must match `rmap` exactly. Bin assignment is right-closed: a radius
/// exactly on an edge falls into the lower bin, and the r = 0 pixel is never
/// included in any bin. Per batch slice and bin, the value is
/// Σ(weight·field)/Σ(weight); a bin with zero total weight yields 0.
///
/// Output shape is the batch shape plus `[edges.len() - 1]`.
pub fn radial_bin(
    field: &ArrayD<f64>,
    rmap: &Array2<f64>,
    edges: &[f64],
    weights: RadialWeights,
) -> Result<ArrayD<f64>> {
    check_edges(edges)?;
    let ndim = field.ndim();
    if ndim < 2 {
        return Err(Error::Shape(format!(
            "field must have at least 2 axes, got rank {ndim}"
        )));
    }
    let (ny, nx) = rmap.dim();
    if field.shape()[ndim - 2] != ny || field.shape()[ndim - 1] != nx {
        return Err(Error::Shape(format!(
            "field trailing axes {:?} do not match the radius map ({ny}, {nx})",
            &field.shape()[ndim - 2..]
        )));
    }
    let npix = ny * nx;
    let pre: Vec<usize> = field.shape()[..ndim - 2].to_vec();
    let nbatch: usize = pre.iter().product();
    let nbins = edges.len() - 1;

    // Right-closed assignment: bin k holds edges[k-1] < r <= edges[k];
    // bin 0 (r <= edges[0], including r = 0) is discarded.
    let bin_ids: Vec<usize> = rmap
        .iter()
        .map(|&r| edges.partition_point(|&e| e < r))
        .collect();

    let wflat: Option<Vec<f64>> = match weights {
        RadialWeights::Unit => None,
        RadialWeights::Map(w) => {
            let wv = w.broadcast(field.raw_dim()).ok_or_else(|| {
                Error::Shape(format!(
                    "weights of shape {:?} do not broadcast to the field shape {:?}",
                    w.shape(),
                    field.shape()
                ))
            })?;
            Some(wv.iter().copied().collect())
        }
        RadialWeights::OfRadius(f) => {
            let wm = f(rmap);
            if wm.dim() != rmap.dim() {
                return Err(Error::Shape(format!(
                    "radius-weight function returned shape {:?}, expected ({ny}, {nx})",
                    wm.dim()
                )));
            }
            let wd = wm.into_dyn();
            let wv = wd.broadcast(field.raw_dim()).ok_or_else(|| {
                Error::Shape("radius weights do not broadcast to the field shape".into())
            })?;
            Some(wv.iter().copied().collect())
        }
    };

    let fflat: Vec<f64> = field.iter().copied().collect();
    let mut out = vec![0.0; nbatch * nbins];
    for b in 0..nbatch {
        let mut wsum = vec![0.0; nbins + 1];
        let mut vsum = vec![0.0; nbins + 1];
        for p in 0..npix {
            let bin = bin_ids[p];
            if bin == 0 || bin > nbins {
                continue;
            }
            let w = match &wflat {
                None => 1.0,
                Some(wf) => wf[b * npix + p],
            };
            wsum[bin] += w;
            vsum[bin] += w * fflat[b * npix + p];
        }
        for k in 1..=nbins {
            out[b * nbins + k - 1] = if wsum[k] != 0.0 { vsum[k] / wsum[k] } else { 0.0 };
        }
    }

    let mut oshape = pre;
    oshape.push(nbins);
    ArrayD::from_shape_vec(IxDyn(&oshape), out).map_err(|e| Error::Shape(e.to_string()))
}

//! Coadds, effective inverse-variance weights, and split noise residuals.
//!
//! A stack of per-split observations with matching inverse-variance (ivar)
//! maps is combined into an inverse-variance-weighted coadd; the difference
//! between a split and the coadd is that split's noise residual, whose
//! inverse variance is the "effective" ivar derived here. Degenerate pixels
//! (no data anywhere, or one split holding all the weight) are handled by
//! explicit mask-then-select logic rather than letting NaN or infinity
//! propagate.

use ndarray::{ArrayD, Axis, Zip};

use crate::error::{Error, Result};

fn check_ivar(ivar: &ArrayD<f64>, split_axis: usize) -> Result<usize> {
    let ndim = ivar.ndim();
    if split_axis >= ndim {
        return Err(Error::Shape(format!(
            "split axis {split_axis} out of range for rank {ndim}"
        )));
    }
    let nsplit = ivar.shape()[split_axis];
    if nsplit < 2 {
        return Err(Error::Validation(format!(
            "need at least 2 splits along axis {split_axis}, got {nsplit}"
        )));
    }
    if ivar.iter().any(|&v| !(v >= 0.0)) {
        return Err(Error::Validation(
            "inverse-variance maps must be non-negative and free of NaN".into(),
        ));
    }
    Ok(nsplit)
}

fn check_stack(map: &ArrayD<f64>, ivar: &ArrayD<f64>, split_axis: usize) -> Result<usize> {
    if map.shape() != ivar.shape() {
        return Err(Error::Shape(format!(
            "map stack shape {:?} does not match ivar stack shape {:?}",
            map.shape(),
            ivar.shape()
        )));
    }
    check_ivar(ivar, split_axis)
}

/// Inverse-variance-weighted coadd over the split axis.
///
/// Per pixel: Σ(map·ivar)/Σ(ivar). A pixel where exactly one split has
/// nonzero ivar is set to that split's map value exactly, sidestepping the
/// floating-point drift of the weighted average in that case; a pixel with
/// zero ivar in every split yields 0. The split axis is removed from the
/// output.
pub fn coadd(map: &ArrayD<f64>, ivar: &ArrayD<f64>, split_axis: usize) -> Result<ArrayD<f64>> {
    check_stack(map, ivar, split_axis)?;
    let ax = Axis(split_axis);

    let num = (map * ivar).sum_axis(ax);
    let den = ivar.sum_axis(ax);
    let hits = ivar.mapv(|v| if v != 0.0 { 1.0 } else { 0.0 });
    let nonzero = hits.sum_axis(ax);
    // Value of the single contributing split, where there is exactly one.
    let picked = (map * &hits).sum_axis(ax);

    let mut out = ArrayD::zeros(den.raw_dim());
    Zip::from(&mut out)
        .and(&num)
        .and(&den)
        .and(&nonzero)
        .and(&picked)
        .for_each(|o, &n, &d, &c, &p| {
            *o = if d == 0.0 {
                0.0
            } else if c == 1.0 {
                p
            } else {
                n / d
            };
        });
    Ok(out)
}

/// Effective inverse variance of each split's noise residual.
///
/// Per split: ivar·Σivar/(Σivar − ivar), the inverse variance a split's
/// noise would need to reproduce the noise in split − coadd. Where the
/// denominator is exactly zero (the split holds all the weight at that
/// pixel, or no split has any), the result saturates to `f64::INFINITY` when
/// `use_inf` is set, else to `f64::MAX`.
pub fn effective_ivar(
    ivar: &ArrayD<f64>,
    split_axis: usize,
    use_inf: bool,
) -> Result<ArrayD<f64>> {
    let nsplit = check_ivar(ivar, split_axis)?;
    let ax = Axis(split_axis);
    let sum = ivar.sum_axis(ax);
    let saturated = if use_inf { f64::INFINITY } else { f64::MAX };

    let mut out = ivar.clone();
    for s in 0..nsplit {
        let mut slice = out.index_axis_mut(ax, s);
        Zip::from(&mut slice).and(&sum).for_each(|o, &total| {
            let den = total - *o;
            *o = if den != 0.0 {
                total * *o / den
            } else {
                saturated
            };
        });
    }
    Ok(out)
}

/// Correction factor sqrt(ivar_eff / ivar) per split.
///
/// Converts a draw from a split-difference map into a draw from that split's
/// noise. Saturated or ivar = 0 pixels are zeroed before the square root so
/// infinity never reaches the output.
pub fn correction_factor(ivar: &ArrayD<f64>, split_axis: usize) -> Result<ArrayD<f64>> {
    let mut out = effective_ivar(ivar, split_axis, true)?;
    Zip::from(&mut out).and(ivar).for_each(|e, &iv| {
        let eff = if e.is_finite() { *e } else { 0.0 };
        *e = if iv != 0.0 { (eff / iv).sqrt() } else { 0.0 };
    });
    Ok(out)
}

/// Per-split noise residual: map − coadd, broadcast back over the split axis.
pub fn noise_residual(
    map: &ArrayD<f64>,
    ivar: &ArrayD<f64>,
    split_axis: usize,
) -> Result<ArrayD<f64>> {
    let nsplit = check_stack(map, ivar, split_axis)?;
    let co = coadd(map, ivar, split_axis)?;
    let mut out = map.clone();
    for s in 0..nsplit {
        let mut slice = out.index_axis_mut(Axis(split_axis), s);
        slice -= &co;
    }
    Ok(out)
}

/// Noise residual scaled to unit variance: residual · sqrt(ivar_eff).
///
/// Uses the max-finite saturation policy so the product stays finite; at a
/// saturated pixel the residual is exactly zero by the coadd special case,
/// so the output is zero there.
pub fn whitened_noise_residual(
    map: &ArrayD<f64>,
    ivar: &ArrayD<f64>,
    split_axis: usize,
) -> Result<ArrayD<f64>> {
    let mut out = noise_residual(map, ivar, split_axis)?;
    let eff = effective_ivar(ivar, split_axis, false)?;
    Zip::from(&mut out).and(&eff).for_each(|o, &e| {
        *o *= e.sqrt();
    });
    Ok(out)
}

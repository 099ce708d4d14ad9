//! Isotropic spectrum estimation and Fourier-domain flattening.
//!
//! A stack of masked split maps is transformed, its auto power summed over
//! the split axis and radially binned into a 1D spectrum per array and
//! polarization component, and each component is divided by the square root
//! of its interpolated spectrum in Fourier space. The result is a whitened
//! ("flattened") map stack whose residual spectrum is unity, plus the
//! recorded 1D spectra for the downstream covariance model.

use ndarray::{Array2, ArrayD, Axis, IxDyn, Zip};
use num_complex::Complex64;
use tracing::debug;

use crate::binning::{radial_bin, RadialWeights};
use crate::error::{Error, Result};
use crate::fft::{fft2, ifft2_real};
use crate::geometry::MapGeometry;
use crate::interp::{bin_centers, CubicSpline};
use crate::reshape::atleast_nd;

/// Domain in which an isotropic filter is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Pointwise multiply in 2D Fourier space by filter(|ℓ|).
    Fourier,
    /// Scale spherical-harmonic coefficients by filter(ℓ). Extension point;
    /// not implemented in this build.
    Spherical,
}

/// Flattening filter 1/sqrt(C(ℓ)) built from a binned spectrum.
#[derive(Debug, Clone)]
pub struct IsotropicFilter {
    spline: CubicSpline,
}

impl IsotropicFilter {
    /// Build the filter from bin edges and the per-bin spectrum, without
    /// validating it against any particular map support.
    pub fn from_spectrum(edges: &[f64], spectrum: &[f64]) -> Result<Self> {
        if spectrum.len() + 1 != edges.len() {
            return Err(Error::Validation(format!(
                "{} spectrum bins do not match {} edges",
                spectrum.len(),
                edges.len()
            )));
        }
        let spline = CubicSpline::new(bin_centers(edges), spectrum.to_vec())?;
        Ok(Self { spline })
    }

    /// Filter value at multipole `ell`.
    pub fn eval(&self, ell: f64) -> f64 {
        1.0 / self.spline.eval(ell).sqrt()
    }

    /// Evaluate over a Fourier-radius map, failing if the filter is
    /// non-finite or non-positive anywhere on that support.
    ///
    /// A failure means the estimated spectrum had a zero or negative bin and
    /// the flattening must not silently proceed.
    pub fn evaluate_checked(&self, rmap: &Array2<f64>) -> Result<Array2<f64>> {
        let out = rmap.mapv(|l| self.eval(l));
        for (&l, &v) in rmap.iter().zip(out.iter()) {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::Numerical(format!(
                    "flattening filter is {v} at multipole {l:.1}; the spectrum estimate has a \
                     zero or negative bin"
                )));
            }
        }
        Ok(out)
    }

    /// Apply this filter to a map stack in the given mode.
    pub fn apply(
        &self,
        map_stack: &ArrayD<f64>,
        mode: FilterMode,
        geom: &MapGeometry,
    ) -> Result<ArrayD<f64>> {
        isotropic_filter(map_stack, |l| self.eval(l), mode, None, geom)
    }
}

/// Build a flattening filter and validate it over the geometry's
/// Fourier-radius support.
pub fn build_flatten_filter(
    edges: &[f64],
    spectrum: &[f64],
    geom: &MapGeometry,
) -> Result<IsotropicFilter> {
    let filt = IsotropicFilter::from_spectrum(edges, spectrum)?;
    filt.evaluate_checked(&geom.modlmap())?;
    Ok(filt)
}

/// Promote a map stack to the canonical (narr, nsplit, npol, ny, nx) rank.
fn promote_stack(map_stack: &ArrayD<f64>, geom: &MapGeometry) -> Result<ArrayD<f64>> {
    if map_stack.ndim() > 5 {
        return Err(Error::Shape(format!(
            "map stack must have rank at most 5 (narr, nsplit, npol, ny, nx), got {}",
            map_stack.ndim()
        )));
    }
    let stack = atleast_nd(map_stack, 5, None)?;
    let (ny, nx) = geom.shape();
    if stack.shape()[3] != ny || stack.shape()[4] != nx {
        return Err(Error::Shape(format!(
            "map trailing axes {:?} do not match the geometry ({ny}, {nx})",
            &stack.shape()[3..]
        )));
    }
    Ok(stack)
}

/// Transform the masked stack and estimate its per-(array, component)
/// isotropic power. Returns the transforms alongside the binned spectra so
/// `flatten` can reuse them.
fn masked_power_spectra(
    map_stack: &ArrayD<f64>,
    mask: Option<&Array2<f64>>,
    edges: &[f64],
    geom: &MapGeometry,
) -> Result<(ArrayD<Complex64>, ArrayD<f64>)> {
    let stack = promote_stack(map_stack, geom)?;
    let (narr, nsplit, npol) = (stack.shape()[0], stack.shape()[1], stack.shape()[2]);
    let (ny, nx) = geom.shape();

    let (masked, w2) = match mask {
        None => (stack, 1.0),
        Some(m) => {
            if m.dim() != (ny, nx) {
                return Err(Error::Shape(format!(
                    "mask shape {:?} does not match the geometry ({ny}, {nx})",
                    m.dim()
                )));
            }
            let w2 = m.mapv(|v| v * v).mean().unwrap_or(0.0);
            if w2 == 0.0 {
                return Err(Error::Validation("mask is identically zero".into()));
            }
            let md = m.view().into_dyn();
            let mb = md.broadcast(stack.raw_dim()).ok_or_else(|| {
                Error::Shape("mask does not broadcast over the map stack".into())
            })?;
            (&stack * &mb, w2)
        }
    };

    let kmap = fft2(&masked, geom)?;

    // Auto power summed over the split axis, per array and component.
    let mut power = ArrayD::zeros(IxDyn(&[narr, npol, ny, nx]));
    for m in 0..narr {
        for a in 0..npol {
            let mut slab = power.index_axis_mut(Axis(0), m).index_axis_move(Axis(0), a);
            for i in 0..nsplit {
                let kv = kmap
                    .index_axis(Axis(0), m)
                    .index_axis_move(Axis(0), i)
                    .index_axis_move(Axis(0), a);
                Zip::from(&mut slab).and(&kv).for_each(|p, k| *p += k.norm_sqr());
            }
        }
    }
    let norm = nsplit as f64 * w2;
    power.mapv_inplace(|v| v / norm);

    let spectra = radial_bin(&power, &geom.modlmap(), edges, RadialWeights::Unit)?;
    Ok((kmap, spectra))
}

/// Estimate the isotropic noise power spectrum of a masked split stack.
///
/// The stack is promoted to (narr, nsplit, npol, ny, nx); the output has
/// shape (narr, npol, nbins). Power is normalized by the split count and by
/// mean(mask²) to undo the mask's sky-fraction suppression.
pub fn estimate_profile(
    map_stack: &ArrayD<f64>,
    mask: Option<&Array2<f64>>,
    edges: &[f64],
    geom: &MapGeometry,
) -> Result<ArrayD<f64>> {
    debug!(
        shape = ?map_stack.shape(),
        nbins = edges.len().saturating_sub(1),
        masked = mask.is_some(),
        "estimating isotropic spectra"
    );
    let (_, spectra) = masked_power_spectra(map_stack, mask, edges, geom)?;
    Ok(spectra)
}

/// Flatten (whiten) a split stack by its own estimated spectra.
///
/// Each (array, component) is multiplied in Fourier space by
/// 1/sqrt(C(ℓ)) with C the cubic-interpolated binned spectrum of that
/// component, shared across splits. Returns the flattened stack at the
/// promoted rank 5, plus the recorded spectra of shape (narr, npol, nbins).
pub fn flatten(
    map_stack: &ArrayD<f64>,
    mask: Option<&Array2<f64>>,
    edges: &[f64],
    geom: &MapGeometry,
) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
    debug!(
        shape = ?map_stack.shape(),
        nbins = edges.len().saturating_sub(1),
        "flattening split stack by estimated spectra"
    );
    let (mut kmap, spectra) = masked_power_spectra(map_stack, mask, edges, geom)?;
    let (narr, nsplit, npol) = (kmap.shape()[0], kmap.shape()[1], kmap.shape()[2]);
    let modl = geom.modlmap();

    for m in 0..narr {
        for a in 0..npol {
            let ys: Vec<f64> = spectra
                .index_axis(Axis(0), m)
                .index_axis_move(Axis(0), a)
                .iter()
                .copied()
                .collect();
            let filt = IsotropicFilter::from_spectrum(edges, &ys)?;
            let lfilter = filt.evaluate_checked(&modl).map_err(|e| match e {
                Error::Numerical(msg) => {
                    Error::Numerical(format!("array {m}, component {a}: {msg}"))
                }
                other => other,
            })?;
            let lf = lfilter.view().into_dyn();
            for i in 0..nsplit {
                let mut ks = kmap
                    .index_axis_mut(Axis(0), m)
                    .index_axis_move(Axis(0), i)
                    .index_axis_move(Axis(0), a);
                Zip::from(&mut ks).and(&lf).for_each(|k, &f| *k *= f);
            }
        }
    }

    let flat = ifft2_real(&kmap, geom)?;
    Ok((flat, spectra))
}

/// Apply an arbitrary isotropic ℓ-space filter to a field.
///
/// `Fourier` mode multiplies the 2D transform pointwise by
/// `lfunc(|ℓ|)` and inverse-transforms; `lmax` is ignored there.
/// `Spherical` mode is a documented extension point and returns
/// [`Error::NotSupported`]; `lmax` would bound the harmonic transform (the
/// geometry's [`MapGeometry::band_limit`] when `None`).
pub fn isotropic_filter<F>(
    field: &ArrayD<f64>,
    lfunc: F,
    mode: FilterMode,
    lmax: Option<usize>,
    geom: &MapGeometry,
) -> Result<ArrayD<f64>>
where
    F: Fn(f64) -> f64,
{
    match mode {
        FilterMode::Fourier => {
            let mut kmap = fft2(field, geom)?;
            let lfilter = geom.modlmap().mapv(|l| lfunc(l)).into_dyn();
            let lfb = lfilter.broadcast(kmap.raw_dim()).ok_or_else(|| {
                Error::Shape("filter map does not broadcast over the field".into())
            })?;
            Zip::from(&mut kmap).and(&lfb).for_each(|k, &f| *k *= f);
            ifft2_real(&kmap, geom)
        }
        FilterMode::Spherical => {
            let _ = lmax.unwrap_or_else(|| geom.band_limit());
            Err(Error::NotSupported(
                "spherical-harmonic filtering is an extension point; use FilterMode::Fourier"
                    .into(),
            ))
        }
    }
}

/// Complementary piecewise-linear low/high-pass pair around `center`.
///
/// Below center − width/2 the low-pass is 1 and the high-pass 0; above
/// center + width/2 the reverse; in between they ramp linearly and sum to 1
/// at every multipole.
pub fn linear_transition_filters(
    center: f64,
    width: f64,
) -> (impl Fn(f64) -> f64, impl Fn(f64) -> f64) {
    let lmin = center - width / 2.0;
    let lmax = center + width / 2.0;
    let ramp = move |ell: f64| (ell - lmin) / (lmax - lmin);
    let low = move |ell: f64| {
        if ell < lmin {
            1.0
        } else if ell >= lmax {
            0.0
        } else {
            1.0 - ramp(ell)
        }
    };
    let high = move |ell: f64| {
        if ell < lmin {
            0.0
        } else if ell >= lmax {
            1.0
        } else {
            ramp(ell)
        }
    };
    (low, high)
}

//! Flat-sky map geometry.
//!
//! The kernels only need three things from a map's projection: the per-pixel
//! Fourier radius (multipole) field, the physical pixel area for spectrum
//! normalization, and a band limit. This struct is the whole collaborator
//! surface; survey-specific WCS handling stays outside the crate.

use ndarray::Array2;
use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Pixelization of a rectangular flat-sky patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapGeometry {
    ny: usize,
    nx: usize,
    /// Pixel height in radians.
    dy: f64,
    /// Pixel width in radians.
    dx: f64,
}

impl MapGeometry {
    /// New geometry with `ny` x `nx` pixels of size `dy` x `dx` radians.
    pub fn new(ny: usize, nx: usize, dy: f64, dx: f64) -> Result<Self> {
        if ny == 0 || nx == 0 {
            return Err(Error::Validation(format!(
                "map extents must be positive, got ({ny}, {nx})"
            )));
        }
        if !(dy.is_finite() && dx.is_finite() && dy > 0.0 && dx > 0.0) {
            return Err(Error::Validation(format!(
                "pixel sizes must be finite and positive, got ({dy}, {dx})"
            )));
        }
        Ok(Self { ny, nx, dy, dx })
    }

    /// Pixel extents (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    /// Total pixel count.
    pub fn npix(&self) -> usize {
        self.ny * self.nx
    }

    /// Solid angle of one pixel, in steradians.
    pub fn pixel_area(&self) -> f64 {
        self.dy * self.dx
    }

    /// Angular frequencies 2π·f along one axis, in FFT layout.
    fn ell_axis(n: usize, d: f64) -> Vec<f64> {
        (0..n)
            .map(|k| {
                let f = if k <= (n - 1) / 2 {
                    k as f64
                } else {
                    k as f64 - n as f64
                };
                2.0 * PI * f / (n as f64 * d)
            })
            .collect()
    }

    /// Per-pixel Fourier radius |ℓ| in FFT layout (the DC mode at [0, 0]).
    pub fn modlmap(&self) -> Array2<f64> {
        let ly = Self::ell_axis(self.ny, self.dy);
        let lx = Self::ell_axis(self.nx, self.dx);
        Array2::from_shape_fn((self.ny, self.nx), |(i, j)| ly[i].hypot(lx[j]))
    }

    /// Multipole band limit supported by the pixelization, π over the pixel
    /// height.
    pub fn band_limit(&self) -> usize {
        (PI / self.dy) as usize
    }
}

/// Separable linear crossfade window for blending adjacent tiles.
///
/// The window is 1 in the interior and ramps linearly to 0 over `fade_y`
/// pixels at the top and bottom and `fade_x` pixels (defaulting to `fade_y`)
/// at the left and right. When the two fades of an axis overlap, the
/// ascending ramp is written last and wins the contested pixels, so a fade
/// spanning the whole extent degrades to a single ascending ramp.
pub fn linear_crossfade(
    ny: usize,
    nx: usize,
    fade_y: usize,
    fade_x: Option<usize>,
) -> Result<Array2<f64>> {
    let fade_x = fade_x.unwrap_or(fade_y);
    if fade_y == 0 || fade_x == 0 {
        return Err(Error::Validation("fade widths must be positive".into()));
    }
    if fade_y > ny || fade_x > nx {
        return Err(Error::Validation(format!(
            "fade widths ({fade_y}, {fade_x}) exceed the tile extents ({ny}, {nx})"
        )));
    }

    let ramp = |m: usize| -> Vec<f64> {
        if m == 1 {
            vec![0.0]
        } else {
            (0..m).map(|i| i as f64 / (m - 1) as f64).collect()
        }
    };

    let mut fys = vec![1.0; ny];
    let ry = ramp(fade_y);
    for i in 0..fade_y {
        fys[ny - fade_y + i] = ry[fade_y - 1 - i];
    }
    fys[..fade_y].copy_from_slice(&ry);

    let mut fxs = vec![1.0; nx];
    let rx = ramp(fade_x);
    for i in 0..fade_x {
        fxs[nx - fade_x + i] = rx[fade_x - 1 - i];
    }
    fxs[..fade_x].copy_from_slice(&rx);

    Ok(Array2::from_shape_fn((ny, nx), |(i, j)| fys[i] * fxs[j]))
}

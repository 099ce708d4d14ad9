//! # mapnoise
//!
//! Numerical kernels for empirical noise covariance of multi-split sky maps.
//!
//! A survey observes the sky several times; differencing each split against
//! the inverse-variance coadd isolates the noise, and these kernels shape
//! that noise into forms a covariance model can consume:
//! - Axis collapsing/restoring for dynamic-rank map stacks
//! - Diagonal-major triangular packing of symmetric covariance axes
//! - Radial (isotropic) binning of 2D Fourier power
//! - Spectral flattening so residuals are unit-variance white noise
//! - Effective per-split inverse-variance weights
//! - Deterministic simulation seed derivation
//!
//! ## Quick Start
//!
//! ```ignore
//! use mapnoise::{whitened_noise_residual, MapGeometry, flatten};
//!
//! // maps, ivar: (nsplit, ny, nx) stacks for one detector array
//! let resid = whitened_noise_residual(&maps, &ivar, 0)?;
//! let geom = MapGeometry::new(ny, nx, dy, dx)?;
//! let (flat, spectra) = flatten(&resid, Some(&mask), &edges, &geom)?;
//! ```
//!
//! All kernels take dynamic-rank [`ndarray::ArrayD`] inputs and return
//! [`Result`] with a structured [`Error`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod error;
pub mod fft;
pub mod geometry;
pub mod interp;
pub mod reshape;
pub mod seed;
pub mod spectral;
pub mod triu;
pub mod weights;

mod thread_pool;

pub use binning::{radial_bin, RadialWeights};
pub use error::{Error, Result};
pub use fft::{fft2, ifft2_real};
pub use geometry::{linear_crossfade, MapGeometry};
pub use interp::{bin_centers, rolling_average, CubicSpline};
pub use reshape::{atleast_nd, flatten_axes, unflatten_axes};
pub use seed::{
    rng_from_seed, standard_normal_map, DataSource, Seed, SeedCatalog, SimKind,
};
pub use spectral::{
    build_flatten_filter, estimate_profile, flatten, isotropic_filter,
    linear_transition_filters, FilterMode, IsotropicFilter,
};
pub use thread_pool::configure_threads;
pub use triu::{
    pack_triu, symmetrize, symmetrized, triangular, triangular_side, triu_indices,
    triu_indices_flat, triu_pos, unpack_triu,
};
pub use weights::{
    coadd, correction_factor, effective_ivar, noise_residual, whitened_noise_residual,
};

//! Error kinds shared by every kernel in the crate.
//!
//! All validation happens eagerly at the top of each operation, so an `Err`
//! always means no partial result was produced. Degenerate-but-physical
//! conditions (a pixel with zero total inverse variance, a split holding all
//! the weight) are handled by documented fill policies in the operations
//! themselves and are never reported through this type.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds raised by the kernels.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Rank or extent mismatch in a reshape, broadcast, or axis argument.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Malformed argument: mismatched matrix axes, a non-triangular packed
    /// length, bad bin edges, or an out-of-contract input value.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A computed quantity is non-finite or non-positive where the physics
    /// requires otherwise (e.g. a flattening filter built from a spectrum
    /// with an empty or negative bin).
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// A name was not found in an injected catalog (foreground type, data
    /// source, season, patch, array, or channel).
    #[error("unknown catalog key: {0}")]
    UnknownKey(String),

    /// A documented extension point that this build does not implement.
    #[error("not supported: {0}")]
    NotSupported(String),
}

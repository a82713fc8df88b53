use thiserror::Error;

/// Errors raised at component boundaries.
///
/// The numeric kernels themselves never fail; everything here is a rejected
/// configuration or a violated call-order precondition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid {what}: {value}")]
    InvalidDimensions { what: &'static str, value: usize },

    #[error("{what} length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("hidden unit {unit}: weight draw has zero sum of squares")]
    DegenerateNormalization { unit: usize },

    #[error("lateral weight ({row}, {col}) = {value} violates the inhibitory invariant")]
    InvalidLateralWeight { row: usize, col: usize, value: f32 },

    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Fail with `DimensionMismatch` unless `actual == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

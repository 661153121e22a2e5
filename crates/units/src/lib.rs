//! Measurement units and conversion for clinsync.
//!
//! This crate provides the closed set of measurement units the
//! synchronization core understands, together with exact conversion between
//! units of the same quantity dimension. Conversion always goes through a
//! dimension-canonical base unit (gram for mass, centimetre for length) so
//! that there is a single source of truth for factors and at most one
//! division contributes rounding error.
//!
//! The crate is pure and stateless: no I/O, no configuration, no clocks.

pub mod measure;

pub use measure::{convert, Dimension, Measurement, Unit};

/// Errors returned by the `units` crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// Conversion was requested across quantity dimensions.
    ///
    /// This signals a misconfigured mapping, not bad runtime data, and must
    /// never be retried.
    #[error("cannot convert between {source} and {target}: incompatible dimensions")]
    IncompatibleUnits {
        /// Unit the value was expressed in.
        source: Unit,
        /// Unit the conversion was requested into.
        target: Unit,
    },

    /// A wire string did not name a known unit.
    #[error("unknown unit: '{0}'")]
    UnknownUnit(String),
}

/// Type alias for Results that can fail with a [`UnitError`].
pub type UnitResult<T> = Result<T, UnitError>;

//! Failures raised while reading a data file's metadata.

use thiserror::Error;

/// Why a data file could not be read. Any of these sends the file to the
/// read-error bucket.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Not a netCDF classic or 64-bit offset file.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File ended inside the header or a data read.
    #[error("Truncated file at byte {offset}")]
    Truncated { offset: u64 },

    /// Header structure is inconsistent.
    #[error("Malformed header: {0}")]
    Malformed(String),

    /// Time `units` is not `<unit> since <date>`.
    #[error("Bad time units: {units}")]
    BadTimeUnits { units: String },

    #[error("Unsupported calendar: {calendar}")]
    UnsupportedCalendar { calendar: String },

    /// A time value does not decode to a representable date.
    #[error("Time value {value} out of range")]
    TimeOutOfRange { value: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

//! Record transformation
//!
//! A transformer turns a source-shaped [`Record`] into a destination-shaped
//! [`TransformedRecord`]. Mapping is pure: no I/O and no shared state, so the
//! same record always maps the same way.

mod profile;

pub use profile::ProfileTransformer;

use crate::error::Result;
use crate::model::{Record, TransformedRecord};

/// Maps records from the source shape to the destination shape
pub trait Transformer: Send + Sync {
    /// Map one record
    ///
    /// `Ok(None)` means the record is intentionally filtered out. A record
    /// that cannot be mapped returns a data-quality error.
    fn map(&self, record: &Record) -> Result<Option<TransformedRecord>>;

    /// Validate the source columns before any record is read
    fn check_columns(&self, _columns: &[String]) -> Result<()> {
        Ok(())
    }
}

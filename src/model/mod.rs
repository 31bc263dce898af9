//! Data model shared by every stage of a sync run
//!
//! - `Cursor` - totally ordered progress marker
//! - `Record` / `Batch` - what the source hands out
//! - `TransformedRecord` / `WriteResult` - what the destination consumes and reports

mod cursor;
mod record;

pub use cursor::{Cursor, Decimal};
pub use record::{Batch, Record, Rejection, TransformedRecord, WriteResult};

#[cfg(test)]
mod tests;

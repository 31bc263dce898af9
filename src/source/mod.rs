//! Source readers
//!
//! A source hands out bounded, ordered batches of records after a cursor.
//! Reads are side-effect free, so fetching twice with the same cursor
//! returns the same data.
//!
//! - `DuckDbSource` - change tables in Postgres, MySQL, SQLite or DuckDB
//! - `MemorySource` - ordered in-memory records

mod database;
mod memory;

pub use database::DuckDbSource;
pub use memory::MemorySource;

use crate::error::{Error, Result};
use crate::model::{Batch, Cursor, Record};
use async_trait::async_trait;

/// Pulls batches of records from the origin system
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch at most `limit` records positioned strictly after `after`
    ///
    /// An empty batch carrying `after` unchanged means there is nothing
    /// more to read for now.
    async fn fetch(&self, after: Option<&Cursor>, limit: usize) -> Result<Batch>;
}

/// Cut a page so that records sharing one cursor value never straddle
/// two batches
///
/// `rows` is the result of reading `limit + 1` records in cursor order. The
/// extra row is a lookahead: if it shares the last kept record's position,
/// the whole trailing group is pushed to the next page. A page made of a
/// single cursor value larger than `limit` cannot be split safely.
pub(crate) fn seal_page(mut rows: Vec<Record>, limit: usize) -> Result<Vec<Record>> {
    if rows.len() <= limit {
        return Ok(rows);
    }
    rows.truncate(limit + 1);
    let Some(lookahead) = rows.pop() else {
        return Ok(rows);
    };

    if rows.last().map(|r| &r.position) == Some(&lookahead.position) {
        while rows.last().is_some_and(|r| r.position == lookahead.position) {
            rows.pop();
        }
        if rows.is_empty() {
            return Err(Error::source_query(format!(
                "more than {limit} records share cursor value {}; increase the batch size",
                lookahead.position
            )));
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests;

//! # Entity Model
//!
//! Owned entity structs for everything the registry persists. Rows map by
//! hand (`FromRow` impls) so enum columns stay plain text in the database
//! and decode failures surface as column-level errors.

pub mod agent;
pub mod alert;
pub mod assignment;
pub mod command;
pub mod incident;
pub mod state;
pub mod subnet;
pub mod target;
pub mod tier;

pub use agent::*;
pub use alert::*;
pub use assignment::*;
pub use command::*;
pub use incident::*;
pub use state::*;
pub use subnet::*;
pub use target::*;
pub use tier::*;

use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;

use crate::types::ParseEnumError;

/// Decode a text column into one of the registry enums.
pub(crate) fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|err: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

/// Decode a nullable text column into an optional registry enum.
pub(crate) fn decode_enum_opt<T>(row: &PgRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|err: ParseEnumError| sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(err),
            }),
        None => Ok(None),
    }
}

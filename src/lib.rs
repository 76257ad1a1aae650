//! Bind a model type to a single SQLite table.
//!
//! A [`TableBinding`] is configured with an ordered list of
//! `(schema fragment, accessor)` columns and a row factory. From those it
//! creates the table, inserts models and reads them back.

pub mod libs;

pub use libs::*;

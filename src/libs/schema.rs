use std::fmt;

use crate::libs::error::{Error, Result};
use crate::libs::value::SqlValue;

/// Reads one column's value out of a model when storing it.
pub type Accessor<M> = Box<dyn Fn(&M) -> SqlValue + Send + Sync>;

/// One registered column: its schema fragment and how to read it from `M`.
///
/// A column without an accessor binds `NULL` on insert, which lets SQLite
/// assign `INTEGER PRIMARY KEY` columns itself.
pub struct Column<M> {
    name: String,
    schema: String,
    accessor: Option<Accessor<M>>,
}

impl<M> Column<M> {
    pub fn new(schema: impl Into<String>, accessor: Option<Accessor<M>>) -> Result<Self> {
        let schema = schema.into().trim().to_string();
        let name = column_name(&schema)?;
        Ok(Self {
            name,
            schema,
            accessor,
        })
    }

    /// The column name, taken from the first token of the fragment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fragment as it appears inside `CREATE TABLE (...)`.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn has_accessor(&self) -> bool {
        self.accessor.is_some()
    }

    pub fn value_of(&self, model: &M) -> SqlValue {
        match &self.accessor {
            Some(get) => get(model),
            None => SqlValue::Null,
        }
    }

    pub(crate) fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl<M> fmt::Debug for Column<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("accessor", &self.accessor.is_some())
            .finish()
    }
}

/// Table and column names are spliced into statement text, so only plain
/// identifiers are accepted.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

fn column_name(schema: &str) -> Result<String> {
    let token = schema.split_whitespace().next().unwrap_or_default();
    let name = unquote(token);
    validate_identifier(name)?;
    Ok(name.to_string())
}

fn unquote(token: &str) -> &str {
    for (open, close) in [('"', '"'), ('`', '`'), ('[', ']')] {
        if token.len() >= 2 && token.starts_with(open) && token.ends_with(close) {
            return &token[1..token.len() - 1];
        }
    }
    token
}

use thiserror::Error;

/// Result alias used by every table operation.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Data access failed: acquiring a connection, preparing, binding,
    /// executing or decoding a column.
    #[error("data access failed: {0}")]
    Database(#[from] sqlx::Error),

    /// The row factory could not turn a row into a model.
    #[error("cannot build `{model}` from row: {message}")]
    Decode { model: &'static str, message: String },

    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("table `{0}` has no columns registered")]
    NoColumns(String),

    #[error("column `{column}` is registered twice on table `{table}`")]
    DuplicateColumn { table: String, column: String },

    #[error("table `{table}` has no registered column `{column}`")]
    UnknownColumn { table: String, column: String },

    /// The live table's columns differ from the registered ones.
    #[error("table `{table}` has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Builds a [`Error::Decode`] for model type `M`. Meant for row factories
    /// that reject a row for reasons the driver cannot see.
    pub fn decode<M>(message: impl Into<String>) -> Self {
        Error::Decode {
            model: std::any::type_name::<M>(),
            message: message.into(),
        }
    }

    /// True when reading or writing rows failed, whether in the driver or in
    /// the row factory.
    pub fn is_data_access(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Decode { .. })
    }
}

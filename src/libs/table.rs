use std::fmt;

use futures::TryStreamExt;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::{debug, error, info, warn};

use crate::libs::connection::ConnectionProvider;
use crate::libs::error::{Error, Result};
use crate::libs::schema::{validate_identifier, Accessor, Column};
use crate::libs::sql;
use crate::libs::value::SqlValue;

/// Key SQLite assigns to an inserted row (its `rowid`).
pub type RowKey = i64;

/// Turns one result row into a model.
pub type RowFactory<M> = Box<dyn Fn(&SqliteRow) -> Result<M> + Send + Sync>;

/// A typed handle to one table.
///
/// Columns are registered on a [`TableBuilder`]; once built, the column list
/// is fixed and drives every statement the binding issues:
///
/// ```ignore
/// let users = TableBinding::builder(pool, "users", |row: &SqliteRow| {
///     Ok(User {
///         id: row.try_get("id")?,
///         name: row.try_get("name")?,
///         age: row.try_get("age")?,
///     })
/// })
/// .add_generated_column("id INTEGER PRIMARY KEY")
/// .add_column("name TEXT NOT NULL", |u: &User| u.name.clone())
/// .add_column("age INTEGER", |u: &User| u.age)
/// .build()?;
///
/// users.init().await?;
/// let key = users.store(&ann).await?;
/// ```
pub struct TableBinding<M, P = SqlitePool> {
    table_name: String,
    columns: Vec<Column<M>>,
    provider: P,
    factory: RowFactory<M>,
}

/// Collects the columns of a [`TableBinding`] before it is used.
pub struct TableBuilder<M, P = SqlitePool> {
    table_name: String,
    pending: Vec<(String, Option<Accessor<M>>)>,
    provider: P,
    factory: RowFactory<M>,
}

impl<M: 'static, P: ConnectionProvider> TableBuilder<M, P> {
    /// Appends a column whose value is read from the model with `accessor`.
    /// Columns are created, and bound on insert, in the order they are added.
    pub fn add_column<F, V>(mut self, schema: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&M) -> V + Send + Sync + 'static,
        V: Into<SqlValue> + 'static,
    {
        let accessor: Accessor<M> =
            Box::new(move |model: &M| -> SqlValue { accessor(model).into() });
        self.pending.push((schema.into(), Some(accessor)));
        self
    }

    /// Appends a column that is always inserted as `NULL`, such as an
    /// `INTEGER PRIMARY KEY` the engine fills in.
    pub fn add_generated_column(mut self, schema: impl Into<String>) -> Self {
        self.pending.push((schema.into(), None));
        self
    }

    /// Fixes the column list. Fails on a bad table or column name, on a
    /// repeated column, or when no column was added.
    pub fn build(self) -> Result<TableBinding<M, P>> {
        validate_identifier(&self.table_name)?;
        if self.pending.is_empty() {
            return Err(Error::NoColumns(self.table_name));
        }

        let mut columns: Vec<Column<M>> = Vec::with_capacity(self.pending.len());
        for (schema, accessor) in self.pending {
            let column = Column::new(schema, accessor)?;
            if columns.iter().any(|c| c.is_named(column.name())) {
                return Err(Error::DuplicateColumn {
                    table: self.table_name,
                    column: column.name().to_string(),
                });
            }
            columns.push(column);
        }

        Ok(TableBinding {
            table_name: self.table_name,
            columns,
            provider: self.provider,
            factory: self.factory,
        })
    }
}

impl<M: 'static, P: ConnectionProvider> TableBinding<M, P> {
    pub fn builder<F>(provider: P, table_name: impl Into<String>, factory: F) -> TableBuilder<M, P>
    where
        F: Fn(&SqliteRow) -> Result<M> + Send + Sync + 'static,
    {
        TableBuilder {
            table_name: table_name.into(),
            pending: Vec::new(),
            provider,
            factory: Box::new(factory),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[Column<M>] {
        &self.columns
    }

    /// Name of the model type, for diagnostics.
    pub fn model_type(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn create_table_sql(&self) -> String {
        sql::create_table(&self.table_name, self.columns.iter().map(Column::schema))
    }

    pub fn insert_sql(&self) -> String {
        sql::insert(&self.table_name, self.columns.len())
    }

    /// Creates the table unless the catalog already lists it.
    ///
    /// An existing table must have the registered columns, by name and in
    /// order, or [`Error::SchemaMismatch`] is returned.
    #[tracing::instrument(skip_all, fields(table = %self.table_name, model = self.model_type()))]
    pub async fn init(&self) -> Result<()> {
        let result = self.create_or_check().await;
        if let Err(e) = &result {
            error!(error = %e, "table init failed");
        }
        result
    }

    async fn create_or_check(&self) -> Result<()> {
        let mut conn = self.provider.acquire().await?;

        let existing: Option<String> = sqlx::query_scalar(sql::TABLE_EXISTS)
            .bind(self.table_name.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        if existing.is_none() {
            let ddl = self.create_table_sql();
            debug!(sql = %ddl, "creating table");
            sqlx::query(&ddl).execute(&mut *conn).await?;
            info!(columns = self.columns.len(), "table created");
            return Ok(());
        }

        let found: Vec<String> = sqlx::query_scalar(sql::TABLE_COLUMNS)
            .bind(self.table_name.as_str())
            .fetch_all(&mut *conn)
            .await?;
        let same = found.len() == self.columns.len()
            && self.columns.iter().zip(&found).all(|(c, f)| c.is_named(f));
        if !same {
            let expected: Vec<String> = self.columns.iter().map(|c| c.name().to_string()).collect();
            warn!(?expected, ?found, "existing table does not match registered columns");
            return Err(Error::SchemaMismatch {
                table: self.table_name.clone(),
                expected,
                found,
            });
        }

        debug!("table already exists");
        Ok(())
    }

    /// Inserts one row built from `model` and returns its generated key, or
    /// `None` when the engine inserted nothing (an `ON CONFLICT IGNORE`
    /// constraint, for instance).
    #[tracing::instrument(skip_all, fields(table = %self.table_name))]
    pub async fn store(&self, model: &M) -> Result<Option<RowKey>> {
        let sql = self.insert_sql();
        let mut query = sqlx::query(&sql);
        for column in &self.columns {
            query = column.value_of(model).bind_to(query);
        }

        let mut conn = self.provider.acquire().await?;
        debug!(sql = %sql, "storing model");
        let done = query.execute(&mut *conn).await?;

        if done.rows_affected() == 0 {
            debug!("no row inserted");
            return Ok(None);
        }
        Ok(Some(done.last_insert_rowid()))
    }

    /// First row whose `column` equals `value`, in whatever order the engine
    /// yields matches.
    ///
    /// `column` must be one of the registered columns.
    #[tracing::instrument(skip_all, fields(table = %self.table_name, column = %column))]
    pub async fn retrieve_one(
        &self,
        column: &str,
        value: impl Into<SqlValue>,
    ) -> Result<Option<M>> {
        let column = self.column(column)?;
        let sql = sql::select_where(&self.table_name, column.name());
        let matches = self.retrieve(&sql, Some(value.into())).await?;
        Ok(matches.into_iter().next())
    }

    /// Every row in the table, in engine scan order.
    #[tracing::instrument(skip_all, fields(table = %self.table_name))]
    pub async fn retrieve_all(&self) -> Result<Vec<M>> {
        self.retrieve(&sql::select_all(&self.table_name), None).await
    }

    /// Runs a select and hydrates rows in result order. The first factory
    /// failure ends the retrieval.
    async fn retrieve(&self, sql: &str, filter: Option<SqlValue>) -> Result<Vec<M>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = filter {
            query = value.bind_to(query);
        }

        let mut conn = self.provider.acquire().await?;
        debug!(sql = %sql, "retrieving models");

        let mut rows = query.fetch(&mut *conn);
        let mut models = Vec::new();
        while let Some(row) = rows.try_next().await? {
            models.push((self.factory)(&row)?);
        }
        debug!(count = models.len(), "models retrieved");
        Ok(models)
    }

    fn column(&self, name: &str) -> Result<&Column<M>> {
        self.columns
            .iter()
            .find(|c| c.is_named(name))
            .ok_or_else(|| Error::UnknownColumn {
                table: self.table_name.clone(),
                column: name.to_string(),
            })
    }
}

impl<M, P> fmt::Debug for TableBinding<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableBinding")
            .field("table_name", &self.table_name)
            .field("model", &std::any::type_name::<M>())
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Pair {
        a: String,
        b: i64,
    }

    fn lazy_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy("sqlite::memory:")
            .unwrap()
    }

    fn never(_: &SqliteRow) -> Result<Pair> {
        Err(Error::decode::<Pair>("unused"))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn binding_is_shareable() {
        assert_send_sync::<TableBinding<Pair>>();
    }

    #[tokio::test]
    async fn statements_follow_registration_order() {
        let table = TableBinding::builder(lazy_pool(), "pairs", never)
            .add_column("a TEXT", |p: &Pair| p.a.clone())
            .add_column("b INTEGER", |p: &Pair| p.b)
            .build()
            .unwrap();

        assert_eq!(table.create_table_sql(), "CREATE TABLE pairs (a TEXT, b INTEGER)");
        assert_eq!(table.insert_sql(), "INSERT INTO pairs VALUES (?, ?)");

        let pair = Pair {
            a: "x".into(),
            b: 2,
        };
        let values: Vec<SqlValue> = table.columns().iter().map(|c| c.value_of(&pair)).collect();
        assert_eq!(values, vec![SqlValue::Text("x".into()), SqlValue::Integer(2)]);
    }

    #[tokio::test]
    async fn build_rejects_bad_setups() {
        let err = TableBinding::builder(lazy_pool(), "pairs", never)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoColumns(_)), "{err}");

        let err = TableBinding::builder(lazy_pool(), "pairs; --", never)
            .add_generated_column("a TEXT")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)), "{err}");

        let err = TableBinding::builder(lazy_pool(), "pairs", never)
            .add_column("a TEXT", |p: &Pair| p.a.clone())
            .add_column("A INTEGER", |p: &Pair| p.b)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateColumn { .. }), "{err}");
    }

    #[tokio::test]
    async fn model_type_names_the_model() {
        let table = TableBinding::builder(lazy_pool(), "pairs", never)
            .add_generated_column("a TEXT")
            .build()
            .unwrap();
        assert!(table.model_type().ends_with("Pair"));
        assert!(format!("{table:?}").contains("pairs"));
    }
}

//! Statement text for a bound table.
//!
//! Table and column names reaching these functions have already been
//! validated as plain identifiers; values are always bound through `?`.

/// Catalog lookup for a table by name. Binds the table name.
pub const TABLE_EXISTS: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?";

/// Live column names of a table, in declaration order. Binds the table name.
pub const TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info(?) ORDER BY cid";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub fn create_table<'a>(table: &str, schemas: impl IntoIterator<Item = &'a str>) -> String {
    let cols: Vec<&str> = schemas.into_iter().collect();
    format!("CREATE TABLE {} ({})", table, cols.join(", "))
}

pub fn insert(table: &str, column_count: usize) -> String {
    format!(
        "INSERT INTO {} VALUES ({})",
        table,
        placeholders(column_count)
    )
}

pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM {}", table)
}

/// The column is quoted so names that are also keywords (`order`, `group`)
/// still parse.
pub fn select_where(table: &str, column: &str) -> String {
    format!("SELECT * FROM {} WHERE {} = ?", table, quote(column))
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

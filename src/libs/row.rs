use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};

use crate::libs::error::{Error, Result};

/// Collects a row into a JSON object keyed by column name.
///
/// Each value is tried as integer, real, text and finally blob (as an array
/// of bytes); SQL `NULL` becomes JSON `null`.
pub fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let i = col.ordinal();
        let value = match row.try_get::<Option<i64>, _>(i) {
            Ok(v) => v.map_or(Value::Null, Value::from),
            Err(_) => match row.try_get::<Option<f64>, _>(i) {
                Ok(v) => v.map_or(Value::Null, Value::from),
                Err(_) => match row.try_get::<Option<String>, _>(i) {
                    Ok(v) => v.map_or(Value::Null, Value::from),
                    Err(_) => match row.try_get::<Option<Vec<u8>>, _>(i) {
                        Ok(v) => v.map_or(Value::Null, Value::from),
                        Err(_) => Value::Null,
                    },
                },
            },
        };
        map.insert(col.name().to_string(), value);
    }
    map
}

/// Row factory for models that implement `Deserialize`, matching fields to
/// columns by name.
///
/// ```ignore
/// let users = TableBinding::builder(pool, "users", from_json_row::<User>)
/// ```
pub fn from_json_row<M: DeserializeOwned>(row: &SqliteRow) -> Result<M> {
    serde_json::from_value(Value::Object(row_to_json(row)))
        .map_err(|e| Error::decode::<M>(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        label: String,
        weight: Option<f64>,
    }

    async fn fetch(sql: &str) -> SqliteRow {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(sql).fetch_one(&pool).await.unwrap()
    }

    #[tokio::test]
    async fn storage_classes_map_to_json() {
        let row = fetch("SELECT 7 AS n, 2.5 AS r, 'hi' AS t, x'0102' AS b, NULL AS z").await;
        assert_eq!(
            Value::Object(row_to_json(&row)),
            json!({"n": 7, "r": 2.5, "t": "hi", "b": [1, 2], "z": null})
        );
    }

    #[tokio::test]
    async fn deserializes_matching_model() {
        let row = fetch("SELECT 1 AS id, 'bolt' AS label, NULL AS weight").await;
        let item: Item = from_json_row(&row).unwrap();
        assert_eq!(
            item,
            Item {
                id: 1,
                label: "bolt".into(),
                weight: None
            }
        );
    }

    #[tokio::test]
    async fn mismatched_row_is_a_decode_error() {
        let row = fetch("SELECT 'one' AS id, 'bolt' AS label").await;
        let err = from_json_row::<Item>(&row).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err}");
    }
}

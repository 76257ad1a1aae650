use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tablebind::{Database, DatabaseConfig, TableBinding};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tablebind=debug")),
        )
        .init();

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;

    let users = TableBinding::builder(db.clone(), "users", |row: &SqliteRow| {
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            age: row.try_get("age")?,
        })
    })
    .add_generated_column("id INTEGER PRIMARY KEY")
    .add_column("name TEXT NOT NULL", |u: &User| u.name.clone())
    .add_column("age INTEGER", |u: &User| u.age)
    .build()?;

    users.init().await?;

    let ann = User {
        id: None,
        name: "Ann".into(),
        age: 30,
    };
    let key = users.store(&ann).await?;
    println!("stored Ann with key {:?}", key);

    println!("{:?}", users.retrieve_one("name", "Ann").await?);
    println!("{:?}", users.retrieve_one("name", "Bob").await?);
    println!("All users: {:?}", users.retrieve_all().await?);

    db.close().await;
    Ok(())
}

pub mod connection;
pub mod error;
pub mod row;
pub mod schema;
pub mod sql;
pub mod table;
pub mod value;

// Re-export them for easier access from applications
pub use connection::*;
pub use error::*;
pub use row::*;
pub use schema::*;
pub use table::*;
pub use value::*;

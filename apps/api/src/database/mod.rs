mod pool;
pub mod queries;
pub mod schema;

pub use pool::*;
pub use schema::{ensure_photo_columns, init_database};

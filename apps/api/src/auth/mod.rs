pub mod extractors;
pub mod jwt;
pub mod password;

pub use extractors::{AppState, CurrentUser, FromRef, OptionalUser, RequireInternal};

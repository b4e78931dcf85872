mod brand;
mod download;
mod favorite;
mod gallery;
mod photo;
mod variant;

pub use brand::*;
pub use download::*;
pub use favorite::*;
pub use gallery::*;
pub use photo::*;
pub use variant::*;

//! Who may see a gallery, how many downloads they may take, and what they favorited.

pub mod cookie;
pub mod favorites;
pub mod gate;
pub mod quota;

pub use gate::{authorize, check_access, load_gallery, require_owner, AccessGrant, Visitor};
pub use quota::{ensure_quota_available, reserve_downloads, reset_quota, QuotaPolicy};

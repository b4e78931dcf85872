pub mod archive;
pub mod artifacts;
pub mod derivatives;
pub mod ingest;
pub mod resolver;
pub mod watermark;
pub mod worker;

pub use archive::{ensure_cached_archive, stream_archive};
pub use artifacts::{delete_gallery, delete_photo, purge_gallery_derivatives};
pub use ingest::ingest_original;
pub use resolver::{DerivativeResolver, ResolvedAsset};
pub use watermark::WatermarkSnapshot;
pub use worker::{start_workers, DerivativeJob, DerivativeQueue, WorkerStats};

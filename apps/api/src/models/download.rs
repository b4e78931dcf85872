use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDownloadQuery {
    pub size: Option<String>,
    #[serde(default)]
    pub link_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    Stream,
    Cached,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDownloadQuery {
    pub size: Option<String>,
    /// Defaults to `cached` on object storage and `stream` on local disk.
    pub mode: Option<ArchiveMode>,
    #[serde(default)]
    pub rebuild: bool,
    #[serde(default)]
    pub link_only: bool,
}

/// Body returned when the caller asks for a link instead of the bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadLinkResponse {
    pub url: String,
    pub filename: String,
}

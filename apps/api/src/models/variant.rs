use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadSize {
    Large,
    Medium,
    Web,
}

impl DownloadSize {
    pub const ALL: [DownloadSize; 3] = [DownloadSize::Large, DownloadSize::Medium, DownloadSize::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadSize::Large => "large",
            DownloadSize::Medium => "medium",
            DownloadSize::Web => "web",
        }
    }
}

/// A named derivative of a photo. Each variant maps to exactly one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Thumb,
    Preview,
    Original,
    Download(DownloadSize),
}

impl Variant {
    /// Variants accepted by the download endpoints' `size` parameter.
    pub const DOWNLOADABLE: [Variant; 4] = [
        Variant::Original,
        Variant::Download(DownloadSize::Large),
        Variant::Download(DownloadSize::Medium),
        Variant::Download(DownloadSize::Web),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Thumb => "thumb",
            Variant::Preview => "preview",
            Variant::Original => "original",
            Variant::Download(size) => size.as_str(),
        }
    }

    /// Parses the download `size` parameter; only original and the download sizes are valid.
    pub fn from_download_size(value: &str) -> Result<Self, AppError> {
        let variant: Variant = value.parse()?;
        if Variant::DOWNLOADABLE.contains(&variant) {
            Ok(variant)
        } else {
            Err(AppError::InvalidVariant(format!(
                "Unsupported download size '{}'; expected original, large, medium or web",
                value
            )))
        }
    }
}

impl FromStr for Variant {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let name = normalized
            .strip_prefix("download:")
            .unwrap_or(normalized.as_str());

        match name {
            "thumb" | "thumbnail" => Ok(Variant::Thumb),
            "preview" => Ok(Variant::Preview),
            "original" => Ok(Variant::Original),
            "large" => Ok(Variant::Download(DownloadSize::Large)),
            "medium" => Ok(Variant::Download(DownloadSize::Medium)),
            "web" => Ok(Variant::Download(DownloadSize::Web)),
            _ => Err(AppError::InvalidVariant(format!("Unknown variant '{}'", value))),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_variants() {
        assert_eq!("thumb".parse::<Variant>().unwrap(), Variant::Thumb);
        assert_eq!("Preview".parse::<Variant>().unwrap(), Variant::Preview);
        assert_eq!(
            "download:medium".parse::<Variant>().unwrap(),
            Variant::Download(DownloadSize::Medium)
        );
        assert_eq!(
            "web".parse::<Variant>().unwrap(),
            Variant::Download(DownloadSize::Web)
        );
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = "huge".parse::<Variant>().unwrap_err();
        assert!(matches!(err, AppError::InvalidVariant(_)));
    }

    #[test]
    fn test_download_size_excludes_internal_variants() {
        assert!(Variant::from_download_size("large").is_ok());
        assert!(Variant::from_download_size("original").is_ok());
        assert!(matches!(
            Variant::from_download_size("thumb"),
            Err(AppError::InvalidVariant(_))
        ));
    }
}

//! Deterministic storage keys. A (photo, variant) pair always maps to the same key.

use crate::models::{Photo, Variant};

pub fn original_key(gallery_id: i64, file_id: &str, extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        format!("{}/original/{}", gallery_id, file_id)
    } else {
        format!("{}/original/{}.{}", gallery_id, file_id, ext.to_ascii_lowercase())
    }
}

pub fn variant_key(gallery_id: i64, stable_id: &str, variant: Variant) -> String {
    match variant {
        Variant::Thumb => format!("{}/thumbs/{}", gallery_id, stable_id),
        Variant::Preview => format!("{}/previews/{}", gallery_id, stable_id),
        Variant::Original | Variant::Download(_) => {
            format!("{}/downloads/{}/{}", gallery_id, variant.as_str(), stable_id)
        }
    }
}

pub fn photo_variant_key(photo: &Photo, variant: Variant) -> String {
    variant_key(photo.gallery_id, &photo.stable_id(), variant)
}

/// Every derivative key a photo can own, in a fixed order.
pub fn all_variant_keys(photo: &Photo) -> Vec<String> {
    let mut variants = vec![Variant::Thumb, Variant::Preview];
    variants.extend(Variant::DOWNLOADABLE);
    variants
        .into_iter()
        .map(|v| photo_variant_key(photo, v))
        .collect()
}

pub fn archive_key(gallery_id: i64, variant: Variant) -> String {
    format!("zips/{}/gallery-{}-{}.zip", gallery_id, gallery_id, variant.as_str())
}

pub fn archive_prefix(gallery_id: i64) -> String {
    format!("zips/{}/", gallery_id)
}

/// Prefixes holding generated artifacts for a gallery; originals are not included.
pub fn derivative_prefixes(gallery_id: i64) -> Vec<String> {
    vec![
        format!("{}/thumbs/", gallery_id),
        format!("{}/previews/", gallery_id),
        format!("{}/downloads/", gallery_id),
        archive_prefix(gallery_id),
    ]
}

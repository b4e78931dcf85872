use crate::error::{AppError, AppResult};
use crate::models::Variant;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Anchor for the watermark, one of the nine cells of a 3x3 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WatermarkPosition {
    #[serde(rename = "tl", alias = "top-left", alias = "top_left")]
    TopLeft,
    #[serde(rename = "t", alias = "top")]
    Top,
    #[serde(rename = "tr", alias = "top-right", alias = "top_right")]
    TopRight,
    #[serde(rename = "l", alias = "left")]
    Left,
    #[serde(rename = "c", alias = "center", alias = "centre")]
    Center,
    #[serde(rename = "r", alias = "right")]
    Right,
    #[serde(rename = "bl", alias = "bottom-left", alias = "bottom_left")]
    BottomLeft,
    #[serde(rename = "b", alias = "bottom")]
    Bottom,
    #[default]
    #[serde(rename = "br", alias = "bottom-right", alias = "bottom_right")]
    BottomRight,
}

impl WatermarkPosition {
    pub fn code(&self) -> &'static str {
        match self {
            WatermarkPosition::TopLeft => "tl",
            WatermarkPosition::Top => "t",
            WatermarkPosition::TopRight => "tr",
            WatermarkPosition::Left => "l",
            WatermarkPosition::Center => "c",
            WatermarkPosition::Right => "r",
            WatermarkPosition::BottomLeft => "bl",
            WatermarkPosition::Bottom => "b",
            WatermarkPosition::BottomRight => "br",
        }
    }

    /// Lenient parse for stored values; anything unknown falls back to bottom-right.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "tl" | "top-left" => WatermarkPosition::TopLeft,
            "t" | "top" => WatermarkPosition::Top,
            "tr" | "top-right" => WatermarkPosition::TopRight,
            "l" | "left" => WatermarkPosition::Left,
            "c" | "center" | "centre" => WatermarkPosition::Center,
            "r" | "right" => WatermarkPosition::Right,
            "bl" | "bottom-left" => WatermarkPosition::BottomLeft,
            "b" | "bottom" => WatermarkPosition::Bottom,
            _ => WatermarkPosition::BottomRight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandSettings {
    #[serde(default)]
    pub studio_name: String,
    #[serde(default)]
    pub wm_enabled: bool,
    #[serde(default = "default_true")]
    pub wm_use_logo: bool,
    #[serde(default)]
    pub wm_logo_key: Option<String>,
    #[serde(default)]
    pub wm_text: String,
    #[serde(default = "default_opacity")]
    pub wm_opacity: f32,
    #[serde(default)]
    pub wm_position: WatermarkPosition,
    #[serde(default = "default_scale")]
    pub wm_scale: f32,
    #[serde(default = "default_true")]
    pub wm_apply_previews: bool,
    #[serde(default)]
    pub wm_apply_thumbs: bool,
    #[serde(default = "default_true")]
    pub wm_apply_downloads: bool,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    0.25
}

fn default_scale() -> f32 {
    0.2
}

impl Default for BrandSettings {
    fn default() -> Self {
        Self {
            studio_name: String::new(),
            wm_enabled: false,
            wm_use_logo: true,
            wm_logo_key: None,
            wm_text: String::new(),
            wm_opacity: default_opacity(),
            wm_position: WatermarkPosition::default(),
            wm_scale: default_scale(),
            wm_apply_previews: true,
            wm_apply_thumbs: false,
            wm_apply_downloads: true,
        }
    }
}

impl BrandSettings {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let position: String = row.get(6)?;
        Ok(BrandSettings {
            studio_name: row.get(0)?,
            wm_enabled: row.get(1)?,
            wm_use_logo: row.get(2)?,
            wm_logo_key: row.get(3)?,
            wm_text: row.get(4)?,
            wm_opacity: row.get::<_, f64>(5)? as f32,
            wm_position: WatermarkPosition::parse(&position),
            wm_scale: row.get::<_, f64>(7)? as f32,
            wm_apply_previews: row.get(8)?,
            wm_apply_thumbs: row.get(9)?,
            wm_apply_downloads: row.get(10)?,
        })
    }

    /// Whether a derivative of this variant carries the watermark.
    pub fn applies_to(&self, variant: Variant) -> bool {
        if !self.wm_enabled {
            return false;
        }
        match variant {
            Variant::Thumb => self.wm_apply_thumbs,
            Variant::Preview => self.wm_apply_previews,
            Variant::Original | Variant::Download(_) => self.wm_apply_downloads,
        }
    }

    pub fn mark_text(&self) -> String {
        let text = self.wm_text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
        let studio = self.studio_name.trim();
        if !studio.is_empty() {
            return format!("(c) {}", studio);
        }
        "(c)".to_string()
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.wm_opacity) {
            return Err(AppError::Validation(
                "Watermark opacity must be between 0 and 1".to_string(),
            ));
        }
        if !(self.wm_scale > 0.0 && self.wm_scale <= 1.0) {
            return Err(AppError::Validation(
                "Watermark scale must be greater than 0 and at most 1".to_string(),
            ));
        }
        Ok(())
    }
}

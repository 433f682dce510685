//! Export - PDF/PNG/JPEG output of a finished design
//!
//! The engine renders; this module owns the options, the naming of the
//! downloaded file and its content digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::engine::{BlockId, DesignEngine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" | "application/pdf" => Ok(ExportFormat::Pdf),
            "png" | "image/png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" => Ok(ExportFormat::Jpeg),
            other => Err(ExportError::InvalidOptions(format!(
                "unknown export format {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    #[error("Engine returned an empty {0} export")]
    Empty(&'static str),

    #[error("Export failed: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub dpi: u32,
    pub jpeg_quality: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            jpeg_quality: 0.9,
        }
    }
}

impl ExportOptions {
    /// Options supplied by a user, checked against printable ranges.
    pub fn new(dpi: u32, jpeg_quality: f32) -> Result<Self, ExportError> {
        if !(72..=1200).contains(&dpi) {
            return Err(ExportError::InvalidOptions(
                "DPI must be between 72 and 1200".into(),
            ));
        }
        if !(0.0..=1.0).contains(&jpeg_quality) {
            return Err(ExportError::InvalidOptions(
                "JPEG quality must be between 0 and 1".into(),
            ));
        }
        Ok(Self { dpi, jpeg_quality })
    }

    /// Screen-resolution preview settings.
    pub fn preview() -> Self {
        Self {
            dpi: 144,
            jpeg_quality: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDesign {
    pub filename: String,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size: usize,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Compute SHA-256 of bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `postcard-<slug>-<unix millis>.<ext>`
pub fn export_filename(design_name: &str, format: ExportFormat, at: DateTime<Utc>) -> String {
    let mut slug = String::with_capacity(design_name.len());
    for c in design_name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "design" } else { slug };
    format!(
        "postcard-{}-{}.{}",
        slug,
        at.timestamp_millis(),
        format.extension()
    )
}

/// Export `block` through the engine and package the result.
pub async fn export_design(
    engine: &dyn DesignEngine,
    block: BlockId,
    format: ExportFormat,
    options: &ExportOptions,
    design_name: &str,
) -> Result<ExportedDesign, ExportError> {
    let bytes = engine.export(block, format, options).await?;
    if bytes.is_empty() {
        return Err(ExportError::Empty(format.mime()));
    }
    let created_at = Utc::now();
    let exported = ExportedDesign {
        filename: export_filename(design_name, format, created_at),
        mime: format.mime().to_string(),
        size: bytes.len(),
        sha256: sha256_hex(&bytes),
        bytes,
        created_at,
    };
    tracing::info!(
        filename = %exported.filename,
        size = exported.size,
        "exported design"
    );
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn options_are_range_checked() {
        assert!(ExportOptions::new(300, 0.9).is_ok());
        assert!(ExportOptions::new(50, 0.9).is_err());
        assert!(ExportOptions::new(300, 1.5).is_err());
    }

    #[test]
    fn filename_is_slugged_and_stamped() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            export_filename("  Spring Cleaning -- Special! ", ExportFormat::Pdf, at),
            "postcard-spring-cleaning-special-1700000000123.pdf"
        );
        assert_eq!(
            export_filename("***", ExportFormat::Jpeg, at),
            "postcard-design-1700000000123.jpg"
        );
    }

    #[test]
    fn format_parses_names_and_mimes() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("image/png".parse::<ExportFormat>().unwrap(), ExportFormat::Png);
        assert!("tiff".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

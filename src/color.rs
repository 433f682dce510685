//! Color values handed to the design engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// RGBA color, each channel in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex color {0:?}: expected #RRGGBB")]
pub struct ColorParseError(pub String);

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    /// Parse exactly six hex digits, with or without a leading `#`.
    ///
    /// Shorthand and alpha forms are rejected: template colors are always
    /// authored as `#RRGGBB`.
    pub fn from_hex(hex: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError(hex.to_string());
        let digits = hex.strip_prefix('#').unwrap_or(hex).as_bytes();
        if digits.len() != 6 {
            return Err(err());
        }
        let byte = |i: usize| -> Option<u8> {
            Some(hex_val(digits[i])? << 4 | hex_val(digits[i + 1])?)
        };
        match (byte(0), byte(2), byte(4)) {
            (Some(r), Some(g), Some(b)) => Ok(Self::from_rgb8(r, g, b)),
            _ => Err(err()),
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn to_hex(&self) -> String {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", c(self.r), c(self.g), c(self.b))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a >= 1.0 {
            f.write_str(&self.to_hex())
        } else {
            write!(f, "{} @ {:.2}", self.to_hex(), self.a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_digit_hex() {
        let c = Rgba::from_hex("#17A2B8").unwrap();
        assert_eq!(c.to_hex(), "#17A2B8");
        assert_eq!(c.a, 1.0);
        assert_eq!(Rgba::from_hex("ffffff").unwrap(), Rgba::WHITE);
    }

    #[test]
    fn rejects_malformed_hex() {
        for bad in ["", "#", "#FFF", "#12345", "#1234567", "#GG0000", "teal", "#ffffffff"] {
            assert!(Rgba::from_hex(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_includes_alpha_when_translucent() {
        assert_eq!(Rgba::BLACK.to_string(), "#000000");
        assert_eq!(Rgba::BLACK.with_alpha(0.25).to_string(), "#000000 @ 0.25");
    }
}

//! Color parsing and conversion utilities

use serde::{Deserialize, Serialize};

/// Straight-alpha color with channels normalized to 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Quantize to 8-bit channels
    #[must_use]
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

/// Utility for parsing and converting colors
pub struct ColorParser;

impl ColorParser {
    /// Parse `#RRGGBB` or `#RRGGBBAA` (case-insensitive, `#` optional).
    ///
    /// Anything else, including the empty string, yields opaque white.
    ///
    /// # Examples
    /// ```rust
    /// use layer_bgremove::utils::{ColorParser, Rgba};
    ///
    /// assert_eq!(ColorParser::parse_rgba_hex("#ff0000"), Rgba::new(1.0, 0.0, 0.0, 1.0));
    /// assert_eq!(ColorParser::parse_rgba_hex("nope"), Rgba::WHITE);
    /// ```
    #[must_use]
    pub fn parse_rgba_hex(input: &str) -> Rgba {
        Self::try_parse_rgba_hex(input).unwrap_or(Rgba::WHITE)
    }

    /// Strict variant of [`ColorParser::parse_rgba_hex`] returning `None` on malformed input
    #[must_use]
    pub fn try_parse_rgba_hex(input: &str) -> Option<Rgba> {
        let hex = input.trim().trim_start_matches('#');

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let channel = |i: usize| -> Option<f32> {
            let pair = hex.get(i * 2..i * 2 + 2)?;
            u8::from_str_radix(pair, 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };

        match hex.len() {
            6 => Some(Rgba::new(channel(0)?, channel(1)?, channel(2)?, 1.0)),
            8 => Some(Rgba::new(
                channel(0)?,
                channel(1)?,
                channel(2)?,
                channel(3)?,
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1.0 / 255.0
    }

    #[test]
    fn test_parse_six_digit() {
        let c = ColorParser::parse_rgba_hex("#112233");
        assert!(close(c.r, 17.0 / 255.0));
        assert!(close(c.g, 34.0 / 255.0));
        assert!(close(c.b, 51.0 / 255.0));
        assert!(close(c.a, 1.0));

        let no_hash = ColorParser::parse_rgba_hex("FFfFff");
        assert_eq!(no_hash, Rgba::WHITE);
    }

    #[test]
    fn test_parse_eight_digit() {
        let c = ColorParser::parse_rgba_hex("#112233cc");
        assert!(close(c.a, 204.0 / 255.0));

        let transparent = ColorParser::parse_rgba_hex("#00000000");
        assert_eq!(transparent, Rgba::TRANSPARENT);
    }

    #[test]
    fn test_every_byte_value_survives() {
        for v in 0..=255u8 {
            let hex = format!("#{v:02x}{v:02X}{v:02x}{v:02x}");
            let c = ColorParser::parse_rgba_hex(&hex);
            let expected = f32::from(v) / 255.0;
            assert!(close(c.r, expected) && close(c.g, expected));
            assert!(close(c.b, expected) && close(c.a, expected));
            assert_eq!(c.to_rgba8(), [v, v, v, v]);
        }
    }

    #[test]
    fn test_malformed_falls_back_to_white() {
        for input in [
            "", "#", "#fff", "#12345", "#1234567", "#123456789", "#gg0000", "zz112233", "#12 345",
            "#+12345", "#ééé", "#１２３４５６",
        ] {
            assert_eq!(ColorParser::parse_rgba_hex(input), Rgba::WHITE, "{input:?}");
            assert!(ColorParser::try_parse_rgba_hex(input).is_none(), "{input:?}");
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(ColorParser::parse_rgba_hex("  #000000ff \n"), Rgba::BLACK);
    }
}

//! Character and paragraph formatting attributes.

use serde::{Deserialize, Serialize};

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Create a color from its channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// The attribute set shared by all characters of one text run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Format {
    /// Bold weight.
    pub bold: bool,
    /// Italic style.
    pub italic: bool,
    /// Underline decoration.
    pub underline: bool,
    /// Strike-through decoration.
    pub strike: bool,
    /// Font family override.
    pub family: Option<String>,
    /// Font size override, in points.
    pub size: Option<u16>,
    /// Text color override.
    pub color: Option<Color>,
}

impl Format {
    /// Plain text: no marks, no overrides.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Returns `true` if no attribute is set.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Returns `true` if any font override is present.
    pub fn has_font_override(&self) -> bool {
        self.family.is_some() || self.size.is_some() || self.color.is_some()
    }

    /// Returns a copy with every attribute named by `delta` set.
    pub fn with_applied(&self, delta: &FormatDelta) -> Self {
        let mut out = self.clone();
        out.bold |= delta.bold;
        out.italic |= delta.italic;
        out.underline |= delta.underline;
        out.strike |= delta.strike;
        if let Some(family) = &delta.family {
            out.family = Some(family.clone());
        }
        if let Some(size) = delta.size {
            out.size = Some(size);
        }
        if let Some(color) = delta.color {
            out.color = Some(color);
        }
        out
    }

    /// Returns a copy with every attribute named by `delta` removed.
    ///
    /// Font overrides are removed regardless of their current value.
    pub fn with_cleared(&self, delta: &FormatDelta) -> Self {
        let mut out = self.clone();
        if delta.bold {
            out.bold = false;
        }
        if delta.italic {
            out.italic = false;
        }
        if delta.underline {
            out.underline = false;
        }
        if delta.strike {
            out.strike = false;
        }
        if delta.family.is_some() {
            out.family = None;
        }
        if delta.size.is_some() {
            out.size = None;
        }
        if delta.color.is_some() {
            out.color = None;
        }
        out
    }

    /// Returns `true` if this format already carries every attribute of `delta`.
    pub fn contains(&self, delta: &FormatDelta) -> bool {
        (!delta.bold || self.bold)
            && (!delta.italic || self.italic)
            && (!delta.underline || self.underline)
            && (!delta.strike || self.strike)
            && (delta.family.is_none() || self.family == delta.family)
            && (delta.size.is_none() || self.size == delta.size)
            && (delta.color.is_none() || self.color == delta.color)
    }
}

/// A set of attributes to apply or clear.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FormatDelta {
    /// Bold weight.
    pub bold: bool,
    /// Italic style.
    pub italic: bool,
    /// Underline decoration.
    pub underline: bool,
    /// Strike-through decoration.
    pub strike: bool,
    /// Font family.
    pub family: Option<String>,
    /// Font size in points.
    pub size: Option<u16>,
    /// Text color.
    pub color: Option<Color>,
}

impl FormatDelta {
    /// Bold only.
    pub fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    /// Italic only.
    pub fn italic() -> Self {
        Self {
            italic: true,
            ..Self::default()
        }
    }

    /// Underline only.
    pub fn underline() -> Self {
        Self {
            underline: true,
            ..Self::default()
        }
    }

    /// Strike-through only.
    pub fn strike() -> Self {
        Self {
            strike: true,
            ..Self::default()
        }
    }

    /// Returns `true` if the delta names no attribute.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Horizontal alignment of the lines of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Flush left (default).
    #[default]
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Both edges flush, except the last line.
    Justify,
}

impl Alignment {
    /// Markup attribute value, `None` for the default.
    pub fn markup_value(self) -> Option<&'static str> {
        match self {
            Alignment::Left => None,
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
            Alignment::Justify => Some("justify"),
        }
    }

    /// Parse a markup attribute value.
    pub fn from_markup_value(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            "justify" => Some(Alignment::Justify),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_then_clear_restores_format() {
        let base = Format {
            italic: true,
            ..Format::default()
        };
        let applied = base.with_applied(&FormatDelta::bold());
        assert!(applied.bold && applied.italic);
        assert_eq!(applied.with_cleared(&FormatDelta::bold()), base);
    }

    #[test]
    fn test_color_hex_roundtrip() {
        let c = Color::from_hex("#1a2B3c").unwrap();
        assert_eq!(c, Color::rgb(0x1a, 0x2b, 0x3c));
        assert_eq!(c.to_hex(), "#1a2b3c");
        assert!(Color::from_hex("1a2b3c").is_none());
        assert!(Color::from_hex("#12345").is_none());
    }

    #[test]
    fn test_contains() {
        let f = Format::plain().with_applied(&FormatDelta::underline());
        assert!(f.contains(&FormatDelta::underline()));
        assert!(!f.contains(&FormatDelta::bold()));
        assert!(f.contains(&FormatDelta::default()));
    }
}

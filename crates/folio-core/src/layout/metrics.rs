//! Text measurement: the host capability and the engine's fallbacks.

use unicode_width::UnicodeWidthChar;

use crate::error::MeasureError;
use crate::format::Format;

/// Tab stops are this many cells wide in [`MonospaceMeasurer`].
pub const TAB_CELLS: usize = 4;

/// Point size that [`MonospaceMeasurer`] and [`FallbackMetrics`] treat as scale 1.
pub const BASE_FONT_SIZE: f32 = 12.0;

/// Extents of a measured piece of text, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunMetrics {
    /// Advance width.
    pub width: f32,
    /// Distance from the baseline to the top.
    pub ascent: f32,
    /// Distance from the baseline to the bottom.
    pub descent: f32,
}

impl RunMetrics {
    /// Ascent plus descent.
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }

    /// Returns `true` if these values cannot be laid out.
    pub fn is_degenerate(&self) -> bool {
        !self.width.is_finite()
            || !self.ascent.is_finite()
            || !self.descent.is_finite()
            || self.width < 0.0
            || self.ascent < 0.0
            || self.descent < 0.0
            || self.height() <= 0.0
    }
}

/// Host-supplied text measurement.
///
/// Implementations must be deterministic for equal inputs. Errors and degenerate results
/// are absorbed by the layout engine, which substitutes [`FallbackMetrics`] for that run.
pub trait TextMeasurer: Send + Sync {
    /// Measure `text` rendered with `format`.
    fn measure(&self, text: &str, format: &Format) -> Result<RunMetrics, MeasureError>;

    /// Measure an inline element. Defaults to the object replacement character.
    fn measure_element(&self, kind: &str, payload: &str) -> Result<RunMetrics, MeasureError> {
        let _ = (kind, payload);
        self.measure(&crate::OBJECT_REPLACEMENT.to_string(), &Format::plain())
    }
}

fn scale(format: &Format) -> f32 {
    format.size.map_or(1.0, |size| f32::from(size) / BASE_FONT_SIZE)
}

fn cells(text: &str) -> usize {
    text.chars()
        .map(|ch| match ch {
            '\t' => TAB_CELLS,
            // UAX #11
            ch => UnicodeWidthChar::width(ch).unwrap_or(1),
        })
        .sum()
}

/// Deterministic cell-grid measurer: every character is `cell_width` times its UAX #11
/// width, scaled by the font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMeasurer {
    /// Width of one narrow cell at the base size.
    pub cell_width: f32,
    /// Ascent at the base size.
    pub ascent: f32,
    /// Descent at the base size.
    pub descent: f32,
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        Self {
            cell_width: 8.0,
            ascent: 12.0,
            descent: 4.0,
        }
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn measure(&self, text: &str, format: &Format) -> Result<RunMetrics, MeasureError> {
        let scale = scale(format);
        Ok(RunMetrics {
            width: cells(text) as f32 * self.cell_width * scale,
            ascent: self.ascent * scale,
            descent: self.descent * scale,
        })
    }
}

/// Fixed-width metrics used when the host measurer fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackMetrics {
    /// Advance per character at the base size.
    pub char_width: f32,
    /// Ascent at the base size.
    pub ascent: f32,
    /// Descent at the base size.
    pub descent: f32,
}

impl Default for FallbackMetrics {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            ascent: 12.0,
            descent: 4.0,
        }
    }
}

impl FallbackMetrics {
    /// Metrics for `text`, one fixed advance per character.
    pub fn measure(&self, text: &str, format: &Format) -> RunMetrics {
        let scale = scale(format);
        RunMetrics {
            width: text.chars().count() as f32 * self.char_width * scale,
            ascent: self.ascent * scale,
            descent: self.descent * scale,
        }
    }
}

/// A measurer plus its fallback; counts how often the fallback was needed.
pub(crate) struct Metrics<'a> {
    pub measurer: &'a dyn TextMeasurer,
    pub fallback: FallbackMetrics,
    pub fallback_runs: usize,
}

impl<'a> Metrics<'a> {
    pub fn new(measurer: &'a dyn TextMeasurer, fallback: FallbackMetrics) -> Self {
        Self {
            measurer,
            fallback,
            fallback_runs: 0,
        }
    }

    pub fn text(&mut self, text: &str, format: &Format) -> RunMetrics {
        match self.measurer.measure(text, format) {
            Ok(m) if !m.is_degenerate() => m,
            Ok(m) => {
                log::warn!("degenerate metrics {m:?} for {} char(s); using fallback", text.chars().count());
                self.fallback_runs += 1;
                self.fallback.measure(text, format)
            }
            Err(err) => {
                log::warn!("{err}; using fallback metrics");
                self.fallback_runs += 1;
                self.fallback.measure(text, format)
            }
        }
    }

    pub fn element(&mut self, kind: &str, payload: &str) -> RunMetrics {
        match self.measurer.measure_element(kind, payload) {
            Ok(m) if !m.is_degenerate() => m,
            _ => {
                log::warn!("measuring inline element {kind:?} failed; using fallback metrics");
                self.fallback_runs += 1;
                self.fallback.measure("\u{FFFC}", &Format::plain())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl TextMeasurer for Broken {
        fn measure(&self, text: &str, _format: &Format) -> Result<RunMetrics, MeasureError> {
            if text.contains('x') {
                Err(MeasureError("font missing".into()))
            } else {
                Ok(RunMetrics {
                    width: f32::NAN,
                    ascent: 1.0,
                    descent: 1.0,
                })
            }
        }
    }

    #[test]
    fn test_monospace_widths() {
        let m = MonospaceMeasurer::default();
        assert_eq!(m.measure("ab", &Format::plain()).unwrap().width, 16.0);
        assert_eq!(m.measure("中", &Format::plain()).unwrap().width, 16.0);
        let big = Format {
            size: Some(24),
            ..Format::default()
        };
        assert_eq!(m.measure("a", &big).unwrap().width, 16.0);
    }

    #[test]
    fn test_errors_and_degenerate_values_fall_back() {
        let mut metrics = Metrics::new(&Broken, FallbackMetrics::default());
        assert_eq!(metrics.text("xyz", &Format::plain()).width, 24.0);
        assert_eq!(metrics.text("ab", &Format::plain()).width, 16.0);
        assert_eq!(metrics.fallback_runs, 2);
    }
}

//! Editor configuration, loadable from TOML.
//!
//! Every section and field has a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! [undo]
//! capacity = 200
//!
//! [layout]
//! table_sizing = "equal"
//!
//! [view]
//! focus_scope = "sentence"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::{PageGeometry, TableSizing};
use crate::view_mode::FocusScope;

/// Undo history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Maximum number of undo groups kept; the oldest are discarded first.
    pub capacity: usize,
    /// Typing within this many milliseconds of the previous keystroke joins its undo group.
    pub coalesce_window_ms: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            coalesce_window_ms: 1000,
        }
    }
}

/// Layout engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Viewport width in pixels.
    pub viewport_width: f32,
    /// Viewport height in pixels.
    pub viewport_height: f32,
    /// Vertical gap between blocks.
    pub paragraph_spacing: f32,
    /// Line height multiplier.
    pub line_spacing: f32,
    /// Padding inside table cells.
    pub cell_padding: f32,
    /// Blocks kept laid out above and below the visible range.
    pub lookahead_blocks: usize,
    /// Line height assumed for blocks that were never measured.
    pub estimated_line_height: f32,
    /// Column sizing policy for tables.
    pub table_sizing: TableSizing,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800.0,
            viewport_height: 600.0,
            paragraph_spacing: 8.0,
            line_spacing: 1.0,
            cell_padding: 4.0,
            lookahead_blocks: 10,
            estimated_line_height: 20.0,
            table_sizing: TableSizing::Content,
        }
    }
}

/// View mode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Typewriter mode keeps the caret line at this fraction of the viewport height.
    pub typewriter_focus: f32,
    /// What focus mode keeps undimmed.
    pub focus_scope: FocusScope,
    /// Opacity applied to dimmed content in focus mode.
    pub focus_dim_opacity: f32,
    /// Text column width in distraction-free mode, as a fraction of the viewport.
    pub distraction_free_text_width: f32,
    /// Show the word count overlay in distraction-free mode.
    pub show_word_count: bool,
    /// Page geometry for page mode.
    pub page: PageGeometry,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            typewriter_focus: 0.4,
            focus_scope: FocusScope::Paragraph,
            focus_dim_opacity: 0.3,
            distraction_free_text_width: 0.6,
            show_word_count: true,
            page: PageGeometry::default(),
        }
    }
}

/// All editor settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo history.
    pub undo: UndoConfig,
    /// Layout engine.
    pub layout: LayoutConfig,
    /// View modes.
    pub view: ViewConfig,
}

impl EditorConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Load a config file. Returns `Ok(None)` if the file does not exist.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            config_path: config_path.to_path_buf(),
            source,
        })?;
        let config: EditorConfig = toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
            config_path: config_path.to_path_buf(),
            source,
        })?;
        Ok(Some(config.sanitized()))
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> Result<(), ConfigError> {
        let config_path = config_path.as_ref();
        let write_error = |source| ConfigError::Write {
            config_path: PathBuf::from(config_path),
            source,
        };
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content).map_err(write_error)
    }

    /// Replace values the engine cannot work with by their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = EditorConfig::default();
        let positive = |v: f32| v.is_finite() && v > 0.0;
        let fraction = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if self.undo.capacity == 0 {
            log::warn!("undo.capacity must be at least 1; using {}", defaults.undo.capacity);
            self.undo.capacity = defaults.undo.capacity;
        }
        for (name, value, default) in [
            ("layout.viewport_width", &mut self.layout.viewport_width, defaults.layout.viewport_width),
            ("layout.viewport_height", &mut self.layout.viewport_height, defaults.layout.viewport_height),
            ("layout.line_spacing", &mut self.layout.line_spacing, defaults.layout.line_spacing),
            (
                "layout.estimated_line_height",
                &mut self.layout.estimated_line_height,
                defaults.layout.estimated_line_height,
            ),
        ] {
            if !positive(*value) {
                log::warn!("{name} must be positive; using {default}");
                *value = default;
            }
        }
        for (name, value, default) in [
            ("view.typewriter_focus", &mut self.view.typewriter_focus, defaults.view.typewriter_focus),
            ("view.focus_dim_opacity", &mut self.view.focus_dim_opacity, defaults.view.focus_dim_opacity),
            (
                "view.distraction_free_text_width",
                &mut self.view.distraction_free_text_width,
                defaults.view.distraction_free_text_width,
            ),
        ] {
            if !fraction(*value) {
                log::warn!("{name} must be within 0..=1; using {default}");
                *value = default;
            }
        }
        if !self.layout.paragraph_spacing.is_finite() || self.layout.paragraph_spacing < 0.0 {
            self.layout.paragraph_spacing = defaults.layout.paragraph_spacing;
        }
        if !self.layout.cell_padding.is_finite() || self.layout.cell_padding < 0.0 {
            self.layout.cell_padding = defaults.layout.cell_padding;
        }
        self
    }
}

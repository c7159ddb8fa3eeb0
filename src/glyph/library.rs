use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{LinecraftError, Result};

/// Character drawn when a glyph is missing from the library.
pub const MISSING_GLYPH: char = '?';

/// One alternative stroke rendering of a character.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeVariant {
    /// SVG path data in glyph units.
    pub path_data: String,
    /// Explicit advance width; `None` defers to the library tables.
    pub advance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlyphEntry {
    pub variants: Vec<StrokeVariant>,
}

/// Library-wide layout metrics, in glyph units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub line_height: f64,
    pub space_width: f64,
    pub char_width: f64,
}

impl Default for GlyphMetrics {
    fn default() -> Self {
        Self {
            line_height: 30.0,
            space_width: 10.0,
            char_width: 18.0,
        }
    }
}

/// A handwriting font: characters mapped to stroke variants plus metrics.
#[derive(Debug, Clone, Default)]
pub struct GlyphLibrary {
    metrics: GlyphMetrics,
    glyphs: HashMap<char, GlyphEntry>,
    widths: HashMap<char, f64>,
}

/// On-disk form of a glyph variant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VariantRepr {
    Path(String),
    Pair(String, f64),
    Sized {
        d: String,
        #[serde(default)]
        width: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GlyphRepr {
    One(VariantRepr),
    Many(Vec<VariantRepr>),
}

#[derive(Debug, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    line_height: Option<f64>,
    #[serde(default)]
    space_width: Option<f64>,
    #[serde(default)]
    char_width: Option<f64>,
    #[serde(default)]
    widths: HashMap<String, f64>,
    glyphs: HashMap<String, GlyphRepr>,
}

impl From<VariantRepr> for StrokeVariant {
    fn from(repr: VariantRepr) -> Self {
        match repr {
            VariantRepr::Path(path_data) => Self {
                path_data,
                advance: None,
            },
            VariantRepr::Pair(path_data, width) => Self {
                path_data,
                advance: Some(width),
            },
            VariantRepr::Sized { d, width } => Self {
                path_data: d,
                advance: width,
            },
        }
    }
}

fn single_char(key: &str) -> Result<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(LinecraftError::Validation(format!(
            "glyph key {key:?} must be exactly one character"
        ))),
    }
}

impl GlyphLibrary {
    pub fn new(metrics: GlyphMetrics) -> Self {
        Self {
            metrics,
            ..Default::default()
        }
    }

    /// Adds (or replaces) the variants for `ch`.
    pub fn insert(&mut self, ch: char, variants: Vec<StrokeVariant>) {
        self.glyphs.insert(ch, GlyphEntry { variants });
    }

    pub fn set_width(&mut self, ch: char, width: f64) {
        self.widths.insert(ch, width);
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: LibraryFile = serde_json::from_str(json)?;
        let defaults = GlyphMetrics::default();
        let mut library = Self::new(GlyphMetrics {
            line_height: file.line_height.unwrap_or(defaults.line_height),
            space_width: file.space_width.unwrap_or(defaults.space_width),
            char_width: file.char_width.unwrap_or(defaults.char_width),
        });

        for (key, width) in file.widths {
            library.set_width(single_char(&key)?, width);
        }
        for (key, repr) in file.glyphs {
            let ch = single_char(&key)?;
            let variants: Vec<StrokeVariant> = match repr {
                GlyphRepr::One(v) => vec![v.into()],
                GlyphRepr::Many(vs) => vs.into_iter().map(Into::into).collect(),
            };
            if variants.is_empty() {
                return Err(LinecraftError::Validation(format!(
                    "glyph {key:?} has no stroke variants"
                )));
            }
            library.insert(ch, variants);
        }
        Ok(library)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| match e {
            LinecraftError::Json(err) => {
                LinecraftError::Validation(format!("{}: {err}", path.display()))
            }
            other => other,
        })
    }

    pub fn metrics(&self) -> GlyphMetrics {
        self.metrics
    }

    /// Looks up `ch`, falling back to the missing-glyph entry.
    pub fn resolve(&self, ch: char) -> Option<&GlyphEntry> {
        self.glyphs
            .get(&ch)
            .or_else(|| self.glyphs.get(&MISSING_GLYPH))
    }

    /// Cursor advance for `ch` drawn with `variant`, before scaling.
    pub fn advance_for(&self, ch: char, variant: Option<&StrokeVariant>) -> f64 {
        variant
            .and_then(|v| v.advance)
            .or_else(|| self.widths.get(&ch).copied())
            .unwrap_or(self.metrics.char_width)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "line_height": 32.0,
        "char_width": 16.0,
        "widths": { "B": 14.0 },
        "glyphs": {
            "A": ["M 0 0 L 10 0", ["M 0 0 L 12 0", 12.5]],
            "B": "M 0 0 L 0 10",
            "?": { "d": "M 0 0 L 5 5" }
        }
    }"#;

    #[test]
    fn parses_all_variant_shapes() {
        let lib = GlyphLibrary::from_json(SAMPLE).unwrap();
        assert_eq!(lib.len(), 3);
        assert_eq!(lib.metrics().line_height, 32.0);
        assert_eq!(lib.metrics().space_width, 10.0);

        let a = lib.resolve('A').unwrap();
        assert_eq!(a.variants.len(), 2);
        assert_eq!(a.variants[0].advance, None);
        assert_eq!(a.variants[1].advance, Some(12.5));
    }

    #[test]
    fn unmapped_char_falls_back_to_missing_glyph() {
        let lib = GlyphLibrary::from_json(SAMPLE).unwrap();
        let fallback = lib.resolve('Z').unwrap();
        assert_eq!(fallback.variants[0].path_data, "M 0 0 L 5 5");
    }

    #[test]
    fn unmapped_char_without_fallback_resolves_nothing() {
        let mut lib = GlyphLibrary::new(GlyphMetrics::default());
        lib.insert(
            'x',
            vec![StrokeVariant {
                path_data: "M 0 0 L 1 1".into(),
                advance: None,
            }],
        );
        assert!(lib.resolve('y').is_none());
    }

    #[test]
    fn advance_prefers_variant_then_table_then_default() {
        let lib = GlyphLibrary::from_json(SAMPLE).unwrap();
        let a = lib.resolve('A').unwrap();
        assert_eq!(lib.advance_for('A', Some(&a.variants[1])), 12.5);
        let b = lib.resolve('B').unwrap();
        assert_eq!(lib.advance_for('B', Some(&b.variants[0])), 14.0);
        assert_eq!(lib.advance_for('A', Some(&a.variants[0])), 16.0);
        assert_eq!(lib.advance_for('Q', None), 16.0);
    }

    #[test]
    fn rejects_multi_char_keys() {
        let err = GlyphLibrary::from_json(r#"{"glyphs": {"AB": "M 0 0"}}"#).unwrap_err();
        assert!(matches!(err, LinecraftError::Validation(_)));
    }

    #[test]
    fn rejects_empty_variant_list() {
        let err = GlyphLibrary::from_json(r#"{"glyphs": {"A": []}}"#).unwrap_err();
        assert!(matches!(err, LinecraftError::Validation(_)));
    }
}

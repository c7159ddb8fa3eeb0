use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::library::GlyphLibrary;
use crate::error::{LinecraftError, Result};

/// Where a font was found. Variable fonts carry several strokes per glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FontKind {
    Variable,
    Standard,
}

impl fmt::Display for FontKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontKind::Variable => write!(f, "Variable"),
            FontKind::Standard => write!(f, "Standard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontInfo {
    pub name: String,
    pub kind: FontKind,
}

/// Named glyph libraries, resolved once at startup.
#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: BTreeMap<String, (FontKind, Arc<GlyphLibrary>)>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `library` under `name`. An existing variable font is kept
    /// over a standard one of the same name.
    pub fn register(&mut self, name: impl Into<String>, kind: FontKind, library: GlyphLibrary) {
        let name = name.into();
        if let Some((existing, _)) = self.fonts.get(&name) {
            if *existing == FontKind::Variable && kind == FontKind::Standard {
                debug!(font = %name, "standard font shadowed by variable font");
                return;
            }
        }
        self.fonts.insert(name, (kind, Arc::new(library)));
    }

    /// Loads every `*.json` library under `dir/variable` and `dir/standard`.
    ///
    /// A missing sub-folder is skipped; an unreadable library file is an error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(LinecraftError::Config(format!(
                "font directory {} not found",
                dir.display()
            )));
        }

        let mut registry = Self::new();
        for (sub, kind) in [("variable", FontKind::Variable), ("standard", FontKind::Standard)] {
            let folder = dir.join(sub);
            if !folder.is_dir() {
                continue;
            }
            let mut entries: Vec<_> = std::fs::read_dir(&folder)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();

            for path in entries {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    warn!(path = %path.display(), "skipping font with non UTF-8 name");
                    continue;
                };
                let library = GlyphLibrary::load(&path)?;
                debug!(font = name, %kind, glyphs = library.len(), "loaded font");
                registry.register(name, kind, library);
            }
        }
        Ok(registry)
    }

    /// Resolves `name`; an unknown font is a configuration error.
    pub fn resolve(&self, name: &str) -> Result<Arc<GlyphLibrary>> {
        self.fonts
            .get(name)
            .map(|(_, lib)| Arc::clone(lib))
            .ok_or_else(|| LinecraftError::Config(format!("font '{name}' not found")))
    }

    /// Fonts sorted by kind (variable first) then name.
    pub fn list(&self) -> Vec<FontInfo> {
        let mut fonts: Vec<FontInfo> = self
            .fonts
            .iter()
            .map(|(name, (kind, _))| FontInfo {
                name: name.clone(),
                kind: *kind,
            })
            .collect();
        fonts.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        fonts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::GlyphMetrics;

    fn write_font(dir: &Path, sub: &str, name: &str, line_height: f64) {
        let folder = dir.join(sub);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(
            folder.join(format!("{name}.json")),
            format!(r#"{{"line_height": {line_height}, "glyphs": {{"a": "M 0 0 L 1 0"}}}}"#),
        )
        .unwrap();
    }

    #[test]
    fn load_dir_reads_both_folders() {
        let dir = tempfile::tempdir().unwrap();
        write_font(dir.path(), "variable", "primary_variation", 30.0);
        write_font(dir.path(), "standard", "block", 25.0);
        std::fs::write(dir.path().join("standard").join("notes.txt"), "ignored").unwrap();

        let registry = FontRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                FontInfo {
                    name: "primary_variation".into(),
                    kind: FontKind::Variable
                },
                FontInfo {
                    name: "block".into(),
                    kind: FontKind::Standard
                },
            ]
        );
        assert_eq!(registry.resolve("block").unwrap().metrics().line_height, 25.0);
    }

    #[test]
    fn variable_font_shadows_standard() {
        let dir = tempfile::tempdir().unwrap();
        write_font(dir.path(), "variable", "script", 40.0);
        write_font(dir.path(), "standard", "script", 20.0);

        let registry = FontRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.resolve("script").unwrap().metrics().line_height, 40.0);
    }

    #[test]
    fn unknown_font_is_config_error() {
        let mut registry = FontRegistry::new();
        registry.register("one", FontKind::Standard, GlyphLibrary::new(GlyphMetrics::default()));
        let err = registry.resolve("two").unwrap_err();
        assert!(matches!(err, LinecraftError::Config(_)));
    }

    #[test]
    fn missing_directory_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FontRegistry::load_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, LinecraftError::Config(_)));
    }
}

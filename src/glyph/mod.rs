mod library;
mod registry;

pub use library::{GlyphEntry, GlyphLibrary, GlyphMetrics, MISSING_GLYPH, StrokeVariant};
pub use registry::{FontInfo, FontKind, FontRegistry};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use super::path::estimate_length;
use super::svg::{Element, NodePath, SvgDocument};
use crate::batch::DataRow;
use crate::error::{LinecraftError, Result};
use crate::glyph::GlyphLibrary;

/// Font size, in template units, that maps to a glyph scale of 1.0.
pub const FONT_REF_HEIGHT: f64 = 20.0;
/// Font size assumed when a text block's style does not declare one.
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

const TEXT_BEARING: &[&str] = &["text", "tspan", "flowPara"];
const STROKE_STYLE: &str =
    "fill:none;stroke:black;stroke-width:2;stroke-linecap:round;stroke-linejoin:round";

/// Shift applied to every generated text block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayoutOffset {
    pub x: f64,
    pub y: f64,
}

/// A template instance with row data rendered as strokes.
#[derive(Debug, Clone)]
pub struct CompiledDocument {
    pub document: SvgDocument,
    pub ink_length_mm: f64,
}

/// Renders one data row at a time into an SVG template using a glyph library.
pub struct TemplateCompiler {
    source: String,
    library: Arc<GlyphLibrary>,
    offset: LayoutOffset,
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Reads `x`/`y`, ignoring a `px` suffix and any list tail. Either one
/// failing resets both to the origin.
pub fn block_position(element: &Element) -> (f64, f64) {
    fn coordinate(element: &Element, key: &str) -> Option<f64> {
        let raw = element.attr(key).unwrap_or("0").replace("px", "");
        raw.split_whitespace().next()?.parse().ok()
    }
    match (coordinate(element, "x"), coordinate(element, "y")) {
        (Some(x), Some(y)) => (x, y),
        _ => (0.0, 0.0),
    }
}

/// Glyph scale from the last parseable `font-size` in the style attribute.
pub fn block_scale(element: &Element) -> f64 {
    let style = element.attr("style").unwrap_or("");
    let mut font_size = DEFAULT_FONT_SIZE;
    for item in style.split(';').filter(|item| item.contains("font-size")) {
        let parsed = item
            .split(':')
            .nth(1)
            .map(|v| v.trim().replace("px", "").replace("pt", ""))
            .and_then(|v| v.parse::<f64>().ok());
        if let Some(size) = parsed {
            font_size = size;
        }
    }
    font_size / FONT_REF_HEIGHT
}

/// Substitution target: the enclosing text block and the field drawn into it.
struct PendingBlock<'a> {
    key_len: usize,
    value: &'a str,
}

impl TemplateCompiler {
    /// Reads the template once. A missing file is a configuration error.
    pub fn new(template_path: &Path, library: Arc<GlyphLibrary>, offset: LayoutOffset) -> Result<Self> {
        let source = std::fs::read_to_string(template_path).map_err(|e| {
            LinecraftError::Config(format!(
                "cannot read template {}: {e}",
                template_path.display()
            ))
        })?;
        Ok(Self::from_source(source, library, offset))
    }

    pub fn from_source(source: impl Into<String>, library: Arc<GlyphLibrary>, offset: LayoutOffset) -> Self {
        Self {
            source: source.into(),
            library,
            offset,
        }
    }

    /// Substitutes `row` into a freshly parsed copy of the template.
    ///
    /// A text block matches a field when the field key, whitespace removed,
    /// occurs in the block's whitespace-free text. Spans resolve to their
    /// enclosing `text` element. Nothing matching is not an error: the
    /// untouched document comes back with zero ink.
    pub fn compile<R: Rng + ?Sized>(&self, row: &DataRow, rng: &mut R) -> Result<CompiledDocument> {
        let mut document = SvgDocument::parse(&self.source)?;
        let pending = self.find_blocks(&document, row);

        if pending.is_empty() {
            debug!("no placeholder matched; template left unchanged");
            return Ok(CompiledDocument {
                document,
                ink_length_mm: 0.0,
            });
        }

        // Rendered in reverse document order so replacing an outer block never
        // strands an inner one. Ink is summed in document order.
        let mut block_inks = Vec::with_capacity(pending.len());
        for (path, block) in pending.iter().rev() {
            let Some(target) = document.element_at(path) else {
                continue;
            };
            let (x, y) = block_position(target);
            let scale = block_scale(target);
            let (group, ink) = self.render_text(block.value, x, y, scale, rng)?;
            trace!(?path, ink, "rendered text block");
            if document.replace(path, group) {
                block_inks.push(ink);
            }
        }
        let ink_length_mm = block_inks.iter().rev().fold(0.0, |total, ink| total + ink);

        Ok(CompiledDocument {
            document,
            ink_length_mm,
        })
    }

    fn find_blocks<'r>(&self, document: &SvgDocument, row: &'r DataRow) -> BTreeMap<NodePath, PendingBlock<'r>> {
        let keys: Vec<(String, &str, &str)> = row
            .iter()
            .map(|(k, v)| (strip_whitespace(k), k, v))
            .collect();
        let nodes = document.descendants();
        let mut pending: BTreeMap<NodePath, PendingBlock<'r>> = BTreeMap::new();

        for (path, element) in &nodes {
            if !TEXT_BEARING.contains(&element.local_name()) {
                continue;
            }
            let content = strip_whitespace(&element.direct_text());
            if content.is_empty() {
                continue;
            }
            for (clean_key, key, value) in &keys {
                if !content.contains(clean_key.as_str()) {
                    continue;
                }
                let target = enclosing_text_block(document, path);
                debug!(field = %key, ?target, "placeholder matched");
                let candidate = PendingBlock {
                    key_len: clean_key.chars().count(),
                    value: *value,
                };
                match pending.get(&target) {
                    Some(existing) if existing.key_len >= candidate.key_len => {}
                    _ => {
                        pending.insert(target, candidate);
                    }
                }
            }
        }
        // The root has no parent to hold a replacement.
        pending.retain(|path, _| !path.is_empty());
        pending
    }

    /// Builds a `<g>` of positioned glyph strokes for `text` and its ink length.
    fn render_text<R: Rng + ?Sized>(
        &self,
        text: &str,
        start_x: f64,
        start_y: f64,
        scale: f64,
        rng: &mut R,
    ) -> Result<(Element, f64)> {
        let metrics = self.library.metrics();
        let origin_x = start_x + self.offset.x;
        let mut cursor_x = origin_x;
        let mut cursor_y = start_y + self.offset.y;
        let mut group = Element::new("g");
        let mut ink = 0.0;

        for ch in text.chars() {
            match ch {
                '\n' => {
                    cursor_x = origin_x;
                    cursor_y += metrics.line_height * scale;
                    continue;
                }
                ' ' => {
                    cursor_x += metrics.space_width * scale;
                    continue;
                }
                _ => {}
            }

            let variant = self
                .library
                .resolve(ch)
                .and_then(|entry| entry.variants.choose(&mut *rng));

            if let Some(variant) = variant.filter(|v| !v.path_data.is_empty()) {
                group.push(
                    Element::new("path")
                        .with_attr("d", variant.path_data.as_str())
                        .with_attr("style", STROKE_STYLE)
                        .with_attr(
                            "transform",
                            format!("translate({cursor_x},{cursor_y}) scale({scale})"),
                        ),
                );
                ink += estimate_length(&variant.path_data)? * scale;
            }
            cursor_x += self.library.advance_for(ch, variant) * scale;
        }

        Ok((group, ink))
    }
}

fn enclosing_text_block(document: &SvgDocument, path: &[usize]) -> NodePath {
    for depth in (1..path.len()).rev() {
        let ancestor = &path[..depth];
        if document
            .element_at(ancestor)
            .is_some_and(|e| e.local_name() == "text")
        {
            return ancestor.to_vec();
        }
    }
    path.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::{GlyphMetrics, StrokeVariant};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn library() -> Arc<GlyphLibrary> {
        let mut lib = GlyphLibrary::new(GlyphMetrics::default());
        let line = |len: f64| StrokeVariant {
            path_data: format!("M 0 0 L {len} 0"),
            advance: None,
        };
        lib.insert('A', vec![line(10.0), line(12.0), line(14.0)]);
        lib.insert('l', vec![line(4.0)]);
        lib.insert('i', vec![line(2.0)]);
        lib.insert('c', vec![line(6.0)]);
        lib.insert('e', vec![line(8.0)]);
        Arc::new(lib)
    }

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        DataRow::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    const TEMPLATE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
  <g id="layer1">
    <text x="10px" y="40" style="font-family:Serif;font-size:40px"><tspan x="10" y="40">{NAME}</tspan></text>
    <text x="5" y="5">Static caption</text>
  </g>
</svg>"#;

    fn compiler() -> TemplateCompiler {
        TemplateCompiler::from_source(TEMPLATE, library(), LayoutOffset::default())
    }

    #[test]
    fn placeholder_is_replaced_by_strokes() {
        let mut rng = StdRng::seed_from_u64(7);
        let out = compiler()
            .compile(&row(&[("NAME", "Alice")]), &mut rng)
            .unwrap();
        let xml = out.document.to_xml();

        assert!(!xml.contains("{NAME}"));
        assert!(xml.contains("Static caption"));
        assert!(out.ink_length_mm > 0.0);

        let groups: Vec<_> = out
            .document
            .descendants()
            .into_iter()
            .filter(|(_, e)| e.local_name() == "g" && e.attr("id").is_none())
            .map(|(_, e)| e.clone())
            .collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].elements().count(), 5);
    }

    #[test]
    fn ink_is_scaled_by_font_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = compiler().compile(&row(&[("NAME", "lie")]), &mut rng).unwrap();
        // font-size 40 over reference 20 doubles every stroke.
        assert!((out.ink_length_mm - (4.0 + 2.0 + 8.0) * 2.0).abs() < 1e-9);
    }

    #[test]
    fn ink_accumulates_in_document_order() {
        let source = r#"<svg>
  <text x="0" y="0" style="font-size:0.5">{ONE}</text>
  <text x="0" y="10" style="font-size:1">{TWO}</text>
  <text x="0" y="20" style="font-size:1.5">{THREE}</text>
</svg>"#;
        let compiler = TemplateCompiler::from_source(source, library(), LayoutOffset::default());
        let data = row(&[("ONE", "l"), ("TWO", "l"), ("THREE", "l")]);
        let out = compiler.compile(&data, &mut StdRng::seed_from_u64(0)).unwrap();
        // Blocks carry 0.1, 0.2 and 0.3 mm; float addition order shows in the last bit.
        assert_eq!(out.ink_length_mm, 0.1 + 0.2 + 0.3);
        assert_ne!(out.ink_length_mm, 0.3 + 0.2 + 0.1);
    }

    #[test]
    fn same_seed_gives_identical_output() {
        let data = row(&[("NAME", "AAAA AAAA")]);
        let first = compiler().compile(&data, &mut StdRng::seed_from_u64(42)).unwrap();
        let second = compiler().compile(&data, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(first.document.to_xml(), second.document.to_xml());
        assert_eq!(first.ink_length_mm, second.ink_length_mm);
    }

    #[test]
    fn unmatched_row_leaves_template_untouched() {
        let mut rng = StdRng::seed_from_u64(3);
        let out = compiler()
            .compile(&row(&[("CITY", "Lisbon")]), &mut rng)
            .unwrap();
        assert_eq!(out.ink_length_mm, 0.0);
        assert_eq!(out.document, SvgDocument::parse(TEMPLATE).unwrap());
    }

    #[test]
    fn matching_ignores_whitespace() {
        let source = r#"<svg><text x="0" y="0">{ FIRST NAME }</text></svg>"#;
        let compiler = TemplateCompiler::from_source(source, library(), LayoutOffset::default());
        let out = compiler
            .compile(&row(&[("FIRSTNAME", "Al")]), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(!out.document.to_xml().contains("FIRST"));
    }

    #[test]
    fn longest_matching_key_wins() {
        let source = r#"<svg><text x="0" y="0">{FIRSTNAME}</text></svg>"#;
        let compiler = TemplateCompiler::from_source(source, library(), LayoutOffset::default());
        let data = row(&[("NAME", "AAAAAAAA"), ("FIRSTNAME", "l")]);
        let out = compiler.compile(&data, &mut StdRng::seed_from_u64(0)).unwrap();
        let scale = DEFAULT_FONT_SIZE / FONT_REF_HEIGHT;
        assert!((out.ink_length_mm - 4.0 * scale).abs() < 1e-9);
    }

    #[test]
    fn layout_walks_cursor_with_offset() {
        let source = r#"<svg><text x="10" y="20" style="font-size:20">{BODY}</text></svg>"#;
        let compiler =
            TemplateCompiler::from_source(source, library(), LayoutOffset { x: 1.0, y: 2.0 });
        let out = compiler
            .compile(&row(&[("BODY", "l l\nl?")]), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let transforms: Vec<String> = out
            .document
            .descendants()
            .into_iter()
            .filter(|(_, e)| e.local_name() == "path")
            .filter_map(|(_, e)| e.attr("transform").map(str::to_string))
            .collect();
        // '?' has no glyph and no fallback: it only advances the cursor.
        assert_eq!(
            transforms,
            vec![
                "translate(11,22) scale(1)",
                "translate(39,22) scale(1)",
                "translate(11,52) scale(1)",
            ]
        );
    }

    #[test]
    fn malformed_metadata_degrades_to_defaults() {
        let element = Element::new("text")
            .with_attr("x", "left")
            .with_attr("y", "3")
            .with_attr("style", "font-size:large");
        assert_eq!(block_position(&element), (0.0, 0.0));
        assert_eq!(block_scale(&element), DEFAULT_FONT_SIZE / FONT_REF_HEIGHT);

        let listed = Element::new("text")
            .with_attr("x", "12px 20px")
            .with_attr("y", "7.5")
            .with_attr("style", "font-size:10pt;font-size:30px");
        assert_eq!(block_position(&listed), (12.0, 7.5));
        assert_eq!(block_scale(&listed), 1.5);
    }

    #[test]
    fn missing_template_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemplateCompiler::new(&dir.path().join("template.svg"), library(), LayoutOffset::default())
            .err()
            .unwrap();
        assert!(matches!(err, LinecraftError::Config(_)));
    }
}

mod compiler;
mod path;
mod svg;

pub use compiler::{
    CompiledDocument, DEFAULT_FONT_SIZE, FONT_REF_HEIGHT, LayoutOffset, TemplateCompiler,
    block_position, block_scale,
};
pub use path::{CURVE_FACTOR, estimate_length, tokenize};
pub use svg::{Element, Node, NodePath, SvgDocument};

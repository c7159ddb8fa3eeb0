//! Minimal owned SVG/XML tree.
//!
//! Only what the compiler touches is modelled: elements with ordered
//! attributes, text and comments. Processing instructions and doctypes are
//! dropped; the writer always emits an XML declaration.

use std::fmt::Write as _;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::escape::{escape, unescape};
use quick_xml::reader::Reader;

use crate::error::{LinecraftError, Result};

/// Index path from the root element down to a descendant element.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tag name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Concatenation of the element's own text children.
    pub fn direct_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Element children with their child index.
    pub fn elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Element(e) => Some((i, e)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvgDocument {
    pub root: Element,
}

fn decode_failure(what: &str, err: impl std::fmt::Display) -> LinecraftError {
    LinecraftError::Validation(format!("cannot decode {what}: {err}"))
}

fn element_from(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element> {
    let name = reader
        .decoder()
        .decode(start.name().as_ref())
        .map_err(|e| decode_failure("tag name", e))?
        .into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes().flatten() {
        let key = reader
            .decoder()
            .decode(attr.key.as_ref())
            .map_err(|e| decode_failure("attribute name", e))?
            .into_owned();
        let raw = reader
            .decoder()
            .decode(&attr.value)
            .map_err(|e| decode_failure("attribute value", e))?;
        // Unknown entities (declared in a DTD we do not read) stay verbatim.
        let value = match unescape(&raw) {
            Ok(v) => v.into_owned(),
            Err(_) => raw.into_owned(),
        };
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(LinecraftError::Validation(
            "document has more than one root element".into(),
        )),
    }
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        let _ = write!(out, " {key}=\"{}\"", escape(value.as_str()));
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(out, e),
            Node::Text(t) => out.push_str(&escape(t.as_str())),
            Node::Comment(c) => {
                let _ = write!(out, "<!--{c}-->");
            }
        }
    }
    let _ = write!(out, "</{}>", element.name);
}

impl SvgDocument {
    pub fn parse(source: &str) -> Result<Self> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let element = element_from(&reader, &e)?;
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from(&reader, &e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        LinecraftError::Validation("unbalanced closing tag".into())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(e) => {
                    let text = e.decode().map_err(|err| decode_failure("text", err))?;
                    push_text(&mut stack, &text);
                }
                Event::CData(e) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| decode_failure("cdata", err))?;
                    push_text(&mut stack, &text);
                }
                Event::GeneralRef(e) => {
                    let name = e.decode().map_err(|err| decode_failure("entity", err))?;
                    let entity = format!("&{name};");
                    match unescape(&entity) {
                        Ok(resolved) => push_text(&mut stack, &resolved),
                        Err(_) => push_text(&mut stack, &entity),
                    }
                }
                Event::Comment(e) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| decode_failure("comment", err))?
                        .into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(LinecraftError::Validation(format!(
                "unclosed element <{}>",
                stack[stack.len() - 1].name
            )));
        }
        let root =
            root.ok_or_else(|| LinecraftError::Validation("document has no root element".into()))?;
        Ok(Self { root })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version='1.0' encoding='utf-8'?>\n");
        write_element(&mut out, &self.root);
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_xml())?;
        Ok(())
    }

    /// Every element in document order, paired with its path. The root has
    /// the empty path.
    pub fn descendants(&self) -> Vec<(NodePath, &Element)> {
        let mut out = Vec::new();
        let mut pending: Vec<(NodePath, &Element)> = vec![(Vec::new(), &self.root)];
        while let Some((path, element)) = pending.pop() {
            let children: Vec<_> = element.elements().collect();
            for (index, child) in children.into_iter().rev() {
                let mut child_path = path.clone();
                child_path.push(index);
                pending.push((child_path, child));
            }
            out.push((path, element));
        }
        out
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        let mut current = &self.root;
        for &index in path {
            current = match current.children.get(index)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = &mut self.root;
        for &index in path {
            current = match current.children.get_mut(index)? {
                Node::Element(e) => e,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Swaps the element at `path` for `replacement`, keeping its position.
    /// The root cannot be replaced.
    pub fn replace(&mut self, path: &[usize], replacement: Element) -> bool {
        let Some((&last, parent_path)) = path.split_last() else {
            return false;
        };
        let Some(parent) = self.element_at_mut(parent_path) else {
            return false;
        };
        match parent.children.get_mut(last) {
            Some(slot) if matches!(slot, Node::Element(_)) => {
                *slot = Node::Element(replacement);
                true
            }
            _ => false,
        }
    }
}

use std::str::FromStr;

use xmltree::{Element, XMLNode};

use super::error::{ImportError, Result};

/// A parsed COLLADA document.
#[derive(Debug)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let root = Element::parse(bytes)
            .map_err(|err| ImportError::malformed("COLLADA", err.to_string()))?;
        if root.name != "COLLADA" {
            return Err(ImportError::malformed(
                "COLLADA",
                format!("unexpected root element <{}>", root.name),
            ));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Resolves a `#id` URL (or a bare id) to the `<name>` element carrying that id.
    pub fn resolve(&self, name: &str, url: &str) -> Result<&Element> {
        let id = fragment(url);
        descendants(&self.root, name)
            .into_iter()
            .find(|element| element.attributes.get("id").map(String::as_str) == Some(id))
            .ok_or_else(|| ImportError::malformed(name, format!("no element with id \"{}\"", id)))
    }
}

/// Strips the leading `#` of a local URL.
pub fn fragment(url: &str) -> &str {
    url.trim().trim_start_matches('#')
}

/// Direct children named `name`, in document order.
pub fn children<'a>(element: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    element.children.iter().filter_map(move |node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

pub fn child<'a>(element: &'a Element, name: &'a str) -> Result<&'a Element> {
    children(element, name).next().ok_or_else(|| {
        ImportError::malformed(
            element.name.as_str(),
            format!("missing child <{}>", name),
        )
    })
}

/// Every element named `name` below `element`, in document (pre-)order, excluding `element`
/// itself.
pub fn descendants<'a>(element: &'a Element, name: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    let mut stack: Vec<&Element> = element_children(element).rev().collect();
    while let Some(current) = stack.pop() {
        if current.name == name {
            found.push(current);
        }
        stack.extend(element_children(current).rev());
    }

    found
}

pub fn first_descendant<'a>(element: &'a Element, name: &str) -> Result<&'a Element> {
    descendants(element, name).into_iter().next().ok_or_else(|| {
        ImportError::malformed(
            element.name.as_str(),
            format!("missing element <{}>", name),
        )
    })
}

/// Every child element, in document order.
pub fn element_children(element: &Element) -> impl DoubleEndedIterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

pub fn attribute<'a>(element: &'a Element, name: &str) -> Result<&'a str> {
    element
        .attributes
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| {
            ImportError::malformed(
                element.name.as_str(),
                format!("missing attribute \"{}\"", name),
            )
        })
}

/// Parses every whitespace separated token of the element text.
pub fn tokens<T: FromStr>(element: &Element) -> Result<Vec<T>> {
    let text = element.get_text().unwrap_or_default();
    text.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| {
                ImportError::malformed(
                    element.name.as_str(),
                    format!("invalid token \"{}\"", token),
                )
            })
        })
        .collect()
}

pub fn names(element: &Element) -> Vec<String> {
    let text = element.get_text().unwrap_or_default();
    text.split_whitespace().map(str::to_string).collect()
}

/// The values of the `<float_array>` of a `<source>`.
pub fn source_floats(source: &Element) -> Result<Vec<f32>> {
    tokens(child(source, "float_array")?)
}

/// A 4x4 matrix from 16 consecutive floats in COLLADA's row-major order.
pub fn row_major_matrix(values: &[f32]) -> Option<glam::Mat4> {
    let values: &[f32; 16] = values.try_into().ok()?;
    Some(glam::Mat4::from_cols_array(values).transpose())
}

/// A shared `<input>` of a primitive or of `<vertex_weights>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub semantic: String,
    pub source: String,
    pub offset: usize,
}

/// Reads the `<input>` children of `element`. Inputs without an offset (unshared inputs)
/// default to offset 0.
pub fn inputs(element: &Element) -> Result<Vec<Input>> {
    children(element, "input")
        .map(|input| {
            let offset = match input.attributes.get("offset") {
                Some(offset) => offset.trim().parse().map_err(|_| {
                    ImportError::malformed("input", format!("invalid offset \"{}\"", offset))
                })?,
                None => 0,
            };

            Ok(Input {
                semantic: attribute(input, "semantic")?.to_string(),
                source: attribute(input, "source")?.to_string(),
                offset,
            })
        })
        .collect()
}

/// The number of indices per vertex of an interleaved index stream.
pub fn stride(inputs: &[Input]) -> usize {
    inputs.iter().map(|input| input.offset + 1).max().unwrap_or(0)
}

/// Looks up the input declaring `semantic`. `element` names the owner in the error.
pub fn find_input<'a>(inputs: &'a [Input], semantic: &str, element: &str) -> Result<&'a Input> {
    inputs
        .iter()
        .find(|input| input.semantic == semantic)
        .ok_or_else(|| {
            ImportError::malformed(element, format!("missing input with semantic {}", semantic))
        })
}

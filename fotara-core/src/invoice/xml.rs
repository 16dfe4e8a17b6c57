//! Thin helpers over the libxml DOM shared by the signing pipeline, the QR reader and the
//! validator.
pub(crate) mod constants;

use constants::NAMESPACES;
use libxml::{
    parser::{Parser, ParserOptions},
    tree::{Document, Node, NodeType},
    xpath,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to parse XML: {message}")]
    Parse { message: String },

    #[error("XPath evaluation failed for {expr}")]
    XPath { expr: String },

    #[error("XPath context error: {message}")]
    Context { message: String },

    #[error("missing {what} in invoice XML")]
    Missing { what: String },

    #[error("failed to modify XML: {message}")]
    Mutation { message: String },

    #[error("failed to import XML fragment")]
    Import,

    #[error("failed to canonicalize XML: {message}")]
    Canonicalize { message: String },
}

/// Strict parse: no error recovery and no network access.
pub(crate) fn parse_document(xml: &str) -> Result<Document, XmlError> {
    let options = ParserOptions {
        recover: false,
        no_net: true,
        ..Default::default()
    };
    Parser::default()
        .parse_string_with_options(xml, options)
        .map_err(|e| XmlError::Parse {
            message: format!("{e:?}"),
        })
}

/// XPath context with every UBL/XAdES prefix registered.
pub(crate) fn context(doc: &Document) -> Result<xpath::Context, XmlError> {
    let ctx = xpath::Context::new(doc).map_err(|e| XmlError::Context {
        message: format!("{e:?}"),
    })?;
    for (prefix, uri) in NAMESPACES {
        ctx.register_namespace(prefix, uri)
            .map_err(|e| XmlError::Context {
                message: format!("{prefix}: {e:?}"),
            })?;
    }
    Ok(ctx)
}

pub(crate) fn nodes(ctx: &xpath::Context, expr: &str) -> Result<Vec<Node>, XmlError> {
    Ok(ctx
        .evaluate(expr)
        .map_err(|_| XmlError::XPath {
            expr: expr.to_string(),
        })?
        .get_nodes_as_vec())
}

pub(crate) fn first_node(ctx: &xpath::Context, expr: &str) -> Result<Option<Node>, XmlError> {
    Ok(nodes(ctx, expr)?.into_iter().next())
}

/// Trimmed text of the first match; `None` when absent or blank.
pub(crate) fn text_value(ctx: &xpath::Context, expr: &str) -> Result<Option<String>, XmlError> {
    Ok(first_node(ctx, expr)?
        .map(|node| node.get_content().trim().to_string())
        .filter(|value| !value.is_empty()))
}

pub(crate) fn required_text(
    ctx: &xpath::Context,
    expr: &str,
    what: &str,
) -> Result<String, XmlError> {
    text_value(ctx, expr)?.ok_or_else(|| XmlError::Missing {
        what: what.to_string(),
    })
}

/// Replaces the children of `node` with a single text node holding `value` verbatim.
pub(crate) fn set_text(node: &mut Node, value: &str) -> Result<(), XmlError> {
    // libxml resolves entity references in content, so markup characters go in escaped.
    node.set_content(&escape(value, false))
        .map_err(|e| XmlError::Mutation {
            message: e.to_string(),
        })
}

pub(crate) fn set_attribute(node: &mut Node, name: &str, value: &str) -> Result<(), XmlError> {
    node.set_attribute(name, value)
        .map_err(|e| XmlError::Mutation {
            message: e.to_string(),
        })
}

/// Parses `xml` and moves its root element into `doc`, detached.
pub(crate) fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, XmlError> {
    let fragment = parse_document(xml)?;
    let mut node = fragment.get_root_element().ok_or(XmlError::Import)?;
    node.unlink();
    doc.import_node(&mut node).map_err(|_| XmlError::Import)
}

pub(crate) fn first_element_child(parent: &Node) -> Option<Node> {
    let mut current = parent.get_first_child();
    while let Some(node) = current {
        if node.is_element_node() {
            return Some(node);
        }
        current = node.get_next_sibling();
    }
    None
}

pub(crate) fn insert_before(anchor: &mut Node, node: &mut Node) -> Result<(), XmlError> {
    anchor
        .add_prev_sibling(node)
        .map(|_| ())
        .map_err(|e| XmlError::Mutation {
            message: e.to_string(),
        })
}

pub(crate) fn insert_after(anchor: &mut Node, node: &mut Node) -> Result<(), XmlError> {
    anchor
        .add_next_sibling(node)
        .map(|_| ())
        .map_err(|e| XmlError::Mutation {
            message: e.to_string(),
        })
}

pub(crate) fn append_child(parent: &mut Node, node: &mut Node) -> Result<(), XmlError> {
    parent
        .add_child(node)
        .map(|_| ())
        .map_err(|e| XmlError::Mutation {
            message: e.to_string(),
        })
}

/// Standalone serialization of one element subtree.
///
/// Each element that uses a prefix not yet declared inside the subtree declares it itself, so
/// the output is self-contained regardless of where the subtree sits in the document. Empty
/// elements self-close and attributes are written in name order.
pub(crate) fn serialize_subtree(node: &Node) -> String {
    let mut out = String::new();
    let mut scope: Vec<(String, String)> = Vec::new();
    write_node(node, &mut scope, &mut out);
    out
}

fn write_node(node: &Node, scope: &mut Vec<(String, String)>, out: &mut String) {
    match node.get_type() {
        Some(NodeType::ElementNode) => write_element(node, scope, out),
        Some(NodeType::TextNode) => out.push_str(&escape(&node.get_content(), false)),
        Some(NodeType::CDataSectionNode) => {
            out.push_str("<![CDATA[");
            out.push_str(&node.get_content());
            out.push_str("]]>");
        }
        _ => {}
    }
}

fn write_element(node: &Node, scope: &mut Vec<(String, String)>, out: &mut String) {
    let scope_depth = scope.len();
    let namespace = node.get_namespace();
    let prefix = namespace
        .as_ref()
        .map(|ns| ns.get_prefix())
        .filter(|p| !p.is_empty());
    let name = match &prefix {
        Some(prefix) => format!("{prefix}:{}", node.get_name()),
        None => node.get_name(),
    };

    out.push('<');
    out.push_str(&name);

    if let Some(ns) = &namespace {
        let declared_prefix = ns.get_prefix();
        let href = ns.get_href();
        let in_scope = scope
            .iter()
            .rev()
            .find(|(p, _)| *p == declared_prefix)
            .is_some_and(|(_, h)| *h == href);
        if !in_scope {
            if declared_prefix.is_empty() {
                out.push_str(&format!(" xmlns=\"{}\"", escape(&href, true)));
            } else {
                out.push_str(&format!(
                    " xmlns:{declared_prefix}=\"{}\"",
                    escape(&href, true)
                ));
            }
            scope.push((declared_prefix, href));
        }
    }

    let mut attributes: Vec<(String, String)> = node.get_attributes().into_iter().collect();
    attributes.sort();
    for (key, value) in attributes {
        out.push_str(&format!(" {key}=\"{}\"", escape(&value, true)));
    }

    let mut child = node.get_first_child();
    if child.is_none() {
        out.push_str("/>");
    } else {
        out.push('>');
        while let Some(current) = child {
            write_node(&current, scope, out);
            child = current.get_next_sibling();
        }
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }

    scope.truncate(scope_depth);
}

pub(crate) fn escape(value: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

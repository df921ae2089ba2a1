//! A small typed query helper over a parsed XML tree.
//!
//! Response documents are parsed once into an owned element tree. Queries use a
//! tiny path syntax that covers what the service bindings need:
//!
//! - `Name/Child` selects children of the context element step by step
//! - `//Name/Child` starts with any descendant-or-self of the context element
//! - `*` matches any element name
//!
//! Every step only matches elements living in the namespace the document was
//! parsed with. A document parsed without a namespace matches on local names only.

use crate::error::AwsError;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: XmlElement,
    namespace: Option<String>,
}

impl XmlDocument {
    pub fn parse(text: &str, namespace: Option<&str>) -> Result<Self, AwsError> {
        let mut reader = NsReader::from_str(text);
        let mut stack: Vec<XmlElement> = Vec::with_capacity(8);
        let mut root = None;

        loop {
            let (resolved, event) = reader.read_resolved_event().map_err(xml_err)?;
            match event {
                Event::Start(e) => {
                    let element = element_from(resolved, &e)?;
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from(resolved, &e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| AwsError::Xml("unbalanced end tag".to_string()))?;
                    // whitespace between child elements is formatting, not content
                    if !element.children.is_empty() {
                        element.text = element.text.trim().to_string();
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        let raw = t.decode().map_err(xml_err)?;
                        top.text.push_str(&unescape(&raw).map_err(xml_err)?);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::GeneralRef(r) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&resolve_reference(&r)?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(AwsError::Xml("unexpected end of document".to_string()));
        }
        let root = root.ok_or_else(|| AwsError::Xml("document has no root element".to_string()))?;

        Ok(Self {
            root,
            namespace: namespace.map(str::to_string),
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn root(&self) -> XmlNode<'_> {
        XmlNode {
            element: &self.root,
            namespace: self.namespace.as_deref(),
        }
    }

    pub fn list(&self, path: &str) -> Vec<XmlNode<'_>> {
        self.root().list(path)
    }

    pub fn node(&self, path: &str) -> Option<XmlNode<'_>> {
        self.root().node(path)
    }

    pub fn value(&self, path: &str) -> Option<String> {
        self.root().value(path)
    }

    /// Like `value`, but a missing element is an error.
    pub fn required(&self, path: &str) -> Result<String, AwsError> {
        self.value(path)
            .ok_or_else(|| AwsError::MissingElement(path.to_string()))
    }
}

/// A borrowed element together with the namespace its queries match against.
#[derive(Debug, Clone, Copy)]
pub struct XmlNode<'a> {
    element: &'a XmlElement,
    namespace: Option<&'a str>,
}

impl<'a> XmlNode<'a> {
    pub fn name(&self) -> &'a str {
        &self.element.name
    }

    pub fn text(&self) -> &'a str {
        &self.element.text
    }

    pub fn element(&self) -> &'a XmlElement {
        self.element
    }

    /// Looks an attribute up by its local name, so `xsi:type` is found as `type`.
    pub fn attribute(&self, local_name: &str) -> Option<&'a str> {
        self.element
            .attributes
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }

    pub fn list(&self, path: &str) -> Vec<XmlNode<'a>> {
        let namespace = self.namespace;
        select(self.element, path, namespace)
            .into_iter()
            .map(|element| XmlNode { element, namespace })
            .collect()
    }

    pub fn node(&self, path: &str) -> Option<XmlNode<'a>> {
        self.list(path).into_iter().next()
    }

    pub fn value(&self, path: &str) -> Option<String> {
        self.node(path).map(|n| n.text().to_string())
    }

    pub fn required(&self, path: &str) -> Result<String, AwsError> {
        self.value(path)
            .ok_or_else(|| AwsError::MissingElement(path.to_string()))
    }
}

fn xml_err<E: std::fmt::Display>(err: E) -> AwsError {
    AwsError::Xml(err.to_string())
}

fn element_from(resolved: ResolveResult<'_>, start: &BytesStart<'_>) -> Result<XmlElement, AwsError> {
    let namespace = match resolved {
        ResolveResult::Bound(Namespace(ns)) => Some(String::from_utf8_lossy(ns).into_owned()),
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map_err(xml_err)?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), AwsError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(AwsError::Xml("more than one root element".to_string())),
    }
    Ok(())
}

fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, AwsError> {
    if let Some(ch) = reference.resolve_char_ref().map_err(xml_err)? {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(xml_err)?;
    Ok(match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{};", name),
    })
}

fn matches(element: &XmlElement, step: &str, namespace: Option<&str>) -> bool {
    (step == "*" || element.name == step)
        && namespace.map_or(true, |ns| element.namespace.as_deref() == Some(ns))
}

fn collect_descendants<'a>(
    element: &'a XmlElement,
    step: &str,
    namespace: Option<&str>,
    out: &mut Vec<&'a XmlElement>,
) {
    if matches(element, step, namespace) {
        out.push(element);
    }
    for child in &element.children {
        collect_descendants(child, step, namespace, out);
    }
}

fn select<'a>(context: &'a XmlElement, path: &str, namespace: Option<&str>) -> Vec<&'a XmlElement> {
    let (descendant, rest) = match path.strip_prefix("//") {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    let mut steps = rest.split('/').filter(|s| !s.is_empty());

    let Some(first) = steps.next() else {
        return Vec::new();
    };

    let mut current = if descendant {
        let mut out = Vec::new();
        collect_descendants(context, first, namespace, &mut out);
        out
    } else {
        context
            .children
            .iter()
            .filter(|c| matches(c, first, namespace))
            .collect()
    };

    for step in steps {
        current = current
            .into_iter()
            .flat_map(|el| el.children.iter().filter(move |c| matches(c, step, namespace)))
            .collect();
    }

    current
}

use super::{XmlError, XmlResult};
use crate::config::NamespaceTable;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;
use std::collections::BTreeMap;

/// Attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

impl XmlAttribute {
    fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// Owned XML element.
///
/// `namespace` is `None` for elements outside any namespace; unprefixed path
/// steps only match those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local_name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Name as spelled in the source document, e.g. `oai:record`.
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }

    /// Direct child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Returns whether this element matches one `prefix:local` path step.
    ///
    /// Unknown prefixes never match.
    pub fn matches(&self, step: &str, namespaces: &NamespaceTable) -> bool {
        let (prefix, local_name) = split_qname(step);
        if self.local_name != local_name {
            return false;
        }
        match prefix {
            Some(prefix) => match namespaces.get(prefix) {
                Some(uri) => self.namespace.as_deref() == Some(uri.as_str()),
                None => false,
            },
            None => self.namespace.is_none(),
        }
    }

    /// First element reached by a relative `/`-separated path.
    pub fn find(&self, path: &str, namespaces: &NamespaceTable) -> Option<&XmlElement> {
        self.find_all(path, namespaces).into_iter().next()
    }

    /// All elements reached by a relative `/`-separated path, in document
    /// order. A `.` step stays on the current element.
    pub fn find_all(&self, path: &str, namespaces: &NamespaceTable) -> Vec<&XmlElement> {
        let mut current = vec![self];
        for step in path.split('/').filter(|step| !step.is_empty()) {
            if step == "." {
                continue;
            }
            current = current
                .into_iter()
                .flat_map(|element| element.elements())
                .filter(|element| element.matches(step, namespaces))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// Concatenated direct text content, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            if let XmlNode::Text(value) = child {
                text.push_str(value);
            }
        }
        text.trim().to_string()
    }

    /// Non-empty text of the element at `path`.
    pub fn text_at(&self, path: &str, namespaces: &NamespaceTable) -> Option<String> {
        self.find(path, namespaces)
            .map(XmlElement::text)
            .filter(|text| !text.is_empty())
    }

    /// Attribute value by `prefix:local` name.
    pub fn attribute(&self, name: &str, namespaces: &NamespaceTable) -> Option<&str> {
        let (prefix, local_name) = split_qname(name);
        let namespace = match prefix {
            Some(prefix) => Some(namespaces.get(prefix)?.as_str()),
            None => None,
        };
        self.attributes
            .iter()
            .find(|attr| attr.local_name == local_name && attr.namespace.as_deref() == namespace)
            .map(|attr| attr.value.as_str())
    }

    /// Serializes this element as a standalone document.
    ///
    /// Namespace declarations inherited from ancestors are re-emitted where
    /// first needed, so the output parses on its own.
    pub fn to_xml_string(&self) -> XmlResult<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self, &BTreeMap::new())?;
        String::from_utf8(writer.into_inner()).map_err(|err| XmlError::Write(err.to_string()))
    }
}

/// Parses an XML document into its root element.
pub fn parse_document(xml: &str) -> XmlResult<XmlElement> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(pair) => pair,
            Err(err) => return Err(XmlError::Parse(err.to_string())),
        };
        let namespace = owned_namespace(resolved)?;

        match event {
            Event::Start(start) => {
                let element = element_from_start(&reader, namespace, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from_start(&reader, namespace, &start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Parse("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| XmlError::Parse(err.to_string()))?;
                push_text(&mut stack, &value);
            }
            Event::CData(cdata) => {
                let value = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                push_text(&mut stack, &value);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::UnexpectedEof {
            element: open.qualified_name(),
        });
    }
    root.ok_or(XmlError::EmptyDocument)
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> XmlResult<XmlElement> {
    let name = start.name();
    let prefix = name.prefix().map(|prefix| decode(prefix.as_ref()));
    let local_name = decode(start.local_name().as_ref());

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| XmlError::Parse(err.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (attr_namespace, attr_local) = reader.resolve_attribute(attr.key);
        let attr_namespace = owned_namespace(attr_namespace)?;
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Parse(err.to_string()))?
            .into_owned();
        attributes.push(XmlAttribute {
            prefix: attr.key.prefix().map(|prefix| decode(prefix.as_ref())),
            namespace: attr_namespace,
            local_name: decode(attr_local.as_ref()),
            value,
        });
    }

    Ok(XmlElement {
        prefix,
        namespace,
        local_name,
        attributes,
        children: Vec::new(),
    })
}

fn owned_namespace(resolved: ResolveResult<'_>) -> XmlResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(decode(namespace.0))),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(XmlError::UnknownPrefix(decode(&prefix))),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> XmlResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::MultipleRoots);
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], value: &str) {
    if value.trim().is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Text(value.to_string()));
    }
}

type Scope = BTreeMap<Option<String>, Option<String>>;

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &XmlElement,
    parent_scope: &Scope,
) -> XmlResult<()> {
    let mut scope = parent_scope.clone();
    let name = element.qualified_name();
    let mut start = BytesStart::new(name.as_str());

    declare(
        &mut start,
        &mut scope,
        element.prefix.as_deref(),
        element.namespace.as_deref(),
    );
    for attr in &element.attributes {
        // `xml:` is bound implicitly and unprefixed attributes carry no namespace.
        if let Some(prefix) = attr.prefix.as_deref().filter(|prefix| *prefix != "xml") {
            declare(&mut start, &mut scope, Some(prefix), attr.namespace.as_deref());
        }
    }
    for attr in &element.attributes {
        start.push_attribute((attr.qualified_name().as_str(), attr.value.as_str()));
    }

    if element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|err| XmlError::Write(err.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|err| XmlError::Write(err.to_string()))?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child, &scope)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|err| XmlError::Write(err.to_string()))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(name.as_str())))
        .map_err(|err| XmlError::Write(err.to_string()))
}

fn declare(start: &mut BytesStart<'_>, scope: &mut Scope, prefix: Option<&str>, uri: Option<&str>) {
    let key = prefix.map(str::to_string);
    let wanted = uri.map(str::to_string);
    match scope.get(&key) {
        Some(current) if *current == wanted => return,
        None if key.is_none() && wanted.is_none() => return,
        _ => {}
    }

    match (prefix, uri) {
        (Some(prefix), Some(uri)) => {
            start.push_attribute((format!("xmlns:{prefix}").as_str(), uri));
        }
        (None, Some(uri)) => start.push_attribute(("xmlns", uri)),
        (None, None) => start.push_attribute(("xmlns", "")),
        (Some(_), None) => return,
    }
    scope.insert(key, wanted);
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local_name)) => (Some(prefix), local_name),
        None => (None, name),
    }
}

fn qualify(prefix: Option<&str>, local_name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

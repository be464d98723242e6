//! Descriptor loading.
//!
//! The XML document is read once with `roxmltree` and copied into an owned
//! [`DescriptorNode`] tree that remembers the source line of every element.
//! Trees are never mutated; substitution passes produce new trees.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ipk_schema::{DESCRIPTOR_VERSION, OsConstraint, ROOT_ELEMENT};
use roxmltree::{Document, NodeType, ParsingOptions};

use crate::error::{CompileError, Diagnostics, Location};

/// A piece of element content, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlContent {
    /// Child element.
    Element(DescriptorNode),
    /// Character data, entities already decoded.
    Text(String),
    /// Comment body.
    Comment(String),
}

/// One element of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorNode {
    /// Qualified element name, prefix included.
    pub name: String,
    /// Namespace declarations made on this element (`None` is the default namespace).
    pub namespaces: Vec<(Option<String>, String)>,
    /// Attributes in document order, keyed by qualified name.
    pub attributes: Vec<(String, String)>,
    /// Child elements, text and comments in document order.
    pub content: Vec<XmlContent>,
    /// 1-based source line (0 for synthesized nodes).
    pub line: u32,
}

impl DescriptorNode {
    /// A synthesized element with no source line.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: append an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder: append a child element.
    #[must_use]
    pub fn with_child(mut self, child: DescriptorNode) -> Self {
        self.content.push(XmlContent::Element(child));
        self
    }

    /// Builder: append a text run.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(XmlContent::Text(text.into()));
        self
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &DescriptorNode> {
        self.content.iter().filter_map(|c| match c {
            XmlContent::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Direct text content, runs joined.
    pub fn text(&self) -> Cow<'_, str> {
        let mut runs = self.content.iter().filter_map(|c| match c {
            XmlContent::Text(t) => Some(t.as_str()),
            _ => None,
        });
        let Some(first) = runs.next() else {
            return Cow::Borrowed("");
        };
        match runs.next() {
            None => Cow::Borrowed(first),
            Some(second) => {
                let mut joined = format!("{first}{second}");
                runs.for_each(|r| joined.push_str(r));
                Cow::Owned(joined)
            }
        }
    }

    /// Value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of attribute `name`, or `default` when absent.
    pub fn attribute_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attribute(name).unwrap_or(default)
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&DescriptorNode> {
        self.children().find(|c| c.name == name)
    }

    /// All children named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DescriptorNode> {
        self.children().filter(move |c| c.name == name)
    }

    /// Trimmed text content, `None` when blank.
    pub fn content(&self) -> Option<Cow<'_, str>> {
        match self.text() {
            Cow::Borrowed(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then_some(Cow::Borrowed(trimmed))
            }
            Cow::Owned(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| Cow::Owned(trimmed.to_string()))
            }
        }
    }
}

/// A loaded descriptor together with the file it came from.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
    /// Root element.
    pub root: DescriptorNode,
}

impl Descriptor {
    /// Read and check an installation descriptor file.
    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::io(Location::file(path), "cannot read descriptor", e))?;
        Self::load_str(&text, Some(path))
    }

    /// Parse and check an installation descriptor held in memory.
    pub fn load_str(text: &str, path: Option<&Path>) -> Result<Self, CompileError> {
        let descriptor = Self {
            path: path.map(Path::to_path_buf),
            root: parse_xml(text, path)?,
        };
        descriptor.check_installation()?;
        Ok(descriptor)
    }

    /// Same file, different tree.
    #[must_use]
    pub fn with_root(&self, root: DescriptorNode) -> Self {
        Self {
            path: self.path.clone(),
            root,
        }
    }

    fn check_installation(&self) -> Result<(), CompileError> {
        if !self.root.name.eq_ignore_ascii_case(ROOT_ELEMENT) {
            return Err(CompileError::MalformedDescriptor {
                at: self.at(&self.root),
                message: format!(
                    "<{}> is not an installation descriptor, expected <{ROOT_ELEMENT}>",
                    self.root.name
                ),
            });
        }
        let version = self.require_attribute(&self.root, "version")?;
        if !version.eq_ignore_ascii_case(DESCRIPTOR_VERSION) {
            return Err(CompileError::VersionMismatch {
                at: self.at(&self.root),
                found: version.to_string(),
                expected: DESCRIPTOR_VERSION,
            });
        }
        Ok(())
    }

    /// Location of `node` within this descriptor.
    pub fn at(&self, node: &DescriptorNode) -> Location {
        Location {
            file: self.path.clone(),
            line: (node.line > 0).then_some(node.line),
        }
    }

    /// Attribute that must be present.
    pub fn require_attribute<'a>(
        &self,
        node: &'a DescriptorNode,
        name: &str,
    ) -> Result<&'a str, CompileError> {
        node.attribute(name)
            .ok_or_else(|| CompileError::MissingRequiredAttribute {
                at: self.at(node),
                element: node.name.clone(),
                attribute: name.to_string(),
            })
    }

    /// Child element that must be present.
    pub fn require_child<'a>(
        &self,
        node: &'a DescriptorNode,
        name: &str,
    ) -> Result<&'a DescriptorNode, CompileError> {
        node.child(name)
            .ok_or_else(|| CompileError::MissingRequiredChild {
                at: self.at(node),
                element: node.name.clone(),
                child: name.to_string(),
            })
    }

    /// Non-empty text content.
    pub fn require_content<'a>(
        &self,
        node: &'a DescriptorNode,
    ) -> Result<Cow<'a, str>, CompileError> {
        node.content().ok_or_else(|| CompileError::InvalidValue {
            at: self.at(node),
            message: format!("<{}> requires content", node.name),
        })
    }

    /// Mandatory `yes`/`no` attribute (`true`/`false` accepted as well).
    pub fn require_yes_no(&self, node: &DescriptorNode, name: &str) -> Result<bool, CompileError> {
        let value = self.require_attribute(node, name)?;
        parse_yes_no(value).ok_or_else(|| CompileError::InvalidValue {
            at: self.at(node),
            message: format!("attribute '{name}' must be 'yes' or 'no', got '{value}'"),
        })
    }

    /// Optional `yes`/`no` attribute; an unrecognised value is warned about
    /// and replaced by `default`.
    pub fn yes_no_or(
        &self,
        node: &DescriptorNode,
        name: &str,
        default: bool,
        diag: &mut Diagnostics,
    ) -> bool {
        let Some(value) = node.attribute(name) else {
            return default;
        };
        parse_yes_no(value).unwrap_or_else(|| {
            let fallback = if default { "yes" } else { "no" };
            diag.warn(
                self.at(node),
                format!(
                    "<{}> attribute '{name}' should be 'yes' or 'no', using '{fallback}'",
                    node.name
                ),
            );
            default
        })
    }

    /// Mandatory non-negative integer attribute.
    pub fn require_u32(&self, node: &DescriptorNode, name: &str) -> Result<u32, CompileError> {
        let value = self.require_attribute(node, name)?;
        value.trim().parse().map_err(|_| CompileError::InvalidValue {
            at: self.at(node),
            message: format!("attribute '{name}' must be an integer, got '{value}'"),
        })
    }
}

fn parse_yes_no(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

/// `<os>` children (plus a legacy `os` family attribute) of `node`.
pub fn os_constraints(node: &DescriptorNode) -> Vec<OsConstraint> {
    let owned = |v: Option<&str>| v.map(str::to_string);
    let mut list: Vec<OsConstraint> = node
        .children_named("os")
        .map(|os| OsConstraint {
            family: owned(os.attribute("family")),
            name: owned(os.attribute("name")),
            version: owned(os.attribute("version")),
            arch: owned(os.attribute("arch")),
            jre: owned(os.attribute("jre")),
        })
        .collect();
    if let Some(family) = node.attribute("os") {
        list.push(OsConstraint::family(family));
    }
    list
}

/// Parse any XML text into an owned tree.
pub fn parse_xml(text: &str, file: Option<&Path>) -> Result<DescriptorNode, CompileError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options).map_err(|e| {
        let pos = e.pos();
        CompileError::MalformedDescriptor {
            at: Location::new(file, pos.row),
            message: e.to_string(),
        }
    })?;
    Ok(convert(&doc, doc.root_element()))
}

fn convert(doc: &Document<'_>, node: roxmltree::Node<'_, '_>) -> DescriptorNode {
    let input = doc.input_text();
    let mut out = DescriptorNode::new(element_qname(input, node));
    out.line = doc.text_pos_at(node.range().start).row;
    out.namespaces = declared_namespaces(node);
    out.attributes = node
        .attributes()
        .map(|a| {
            let qname = input.get(a.range_qname()).unwrap_or(a.name());
            (qname.to_string(), a.value().to_string())
        })
        .collect();
    for child in node.children() {
        let item = match child.node_type() {
            NodeType::Element => XmlContent::Element(convert(doc, child)),
            NodeType::Text => XmlContent::Text(child.text().unwrap_or_default().to_string()),
            NodeType::Comment => XmlContent::Comment(child.text().unwrap_or_default().to_string()),
            NodeType::Root | NodeType::PI => continue,
        };
        out.content.push(item);
    }
    out
}

/// The tag name as written, falling back to the local name.
fn element_qname(input: &str, node: roxmltree::Node<'_, '_>) -> String {
    let local = node.tag_name().name();
    let written = input
        .get(node.range().start..)
        .and_then(|s| s.strip_prefix('<'))
        .and_then(|s| {
            s.split(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .next()
        });
    match written {
        Some(qname) if qname.rsplit(':').next() == Some(local) => qname.to_string(),
        _ => local.to_string(),
    }
}

/// Namespaces in scope on `node` that its parent element does not already have.
fn declared_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<(Option<String>, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    node.namespaces()
        .filter(|ns| ns.uri() != roxmltree::NS_XML_URI)
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
        .collect()
}

/// Serialize a tree as a UTF-8 XML document.
///
/// Content is written back in document order without reformatting, so a
/// parsed document keeps its text layout.
pub fn write_xml(root: &DescriptorNode) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_node(&mut out, root);
    out.push('\n');
    out
}

fn write_node(out: &mut String, node: &DescriptorNode) {
    let _ = write!(out, "<{}", node.name);
    for (prefix, uri) in &node.namespaces {
        match prefix {
            Some(prefix) => {
                let _ = write!(out, " xmlns:{prefix}=\"{}\"", escape(uri, true));
            }
            None => {
                let _ = write!(out, " xmlns=\"{}\"", escape(uri, true));
            }
        }
    }
    for (k, v) in &node.attributes {
        let _ = write!(out, " {k}=\"{}\"", escape(v, true));
    }
    if node.content.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for item in &node.content {
        match item {
            XmlContent::Element(child) => write_node(out, child),
            XmlContent::Text(text) => out.push_str(&escape(text, false)),
            XmlContent::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
        }
    }
    let _ = write!(out, "</{}>", node.name);
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<installation version="1.0">
  <info>
    <appname>Demo</appname>
  </info>
  <packs>
    <pack name="core" required="yes"/>
  </packs>
</installation>"#;

    #[test]
    fn test_load_records_lines() {
        let d = Descriptor::load_str(MINIMAL, Some(Path::new("install.xml"))).unwrap();
        let info = d.root.child("info").unwrap();
        assert_eq!(info.line, 3);
        assert_eq!(info.child("appname").unwrap().content().as_deref(), Some("Demo"));
        let pack = d.root.child("packs").unwrap().child("pack").unwrap();
        assert_eq!(d.at(pack).to_string(), "install.xml:6");
    }

    #[test]
    fn test_wrong_root_is_malformed() {
        let err = Descriptor::load_str(r#"<project version="1.0"/>"#, None).unwrap_err();
        assert!(matches!(err, CompileError::MalformedDescriptor { .. }));
    }

    #[test]
    fn test_version_checks() {
        let err = Descriptor::load_str(r#"<installation version="5.0"/>"#, None).unwrap_err();
        assert!(matches!(err, CompileError::VersionMismatch { ref found, .. } if found == "5.0"));

        let err = Descriptor::load_str("<installation/>", None).unwrap_err();
        assert!(matches!(err, CompileError::MissingRequiredAttribute { .. }));

        assert!(Descriptor::load_str(r#"<Installation version="1.0"/>"#, None).is_ok());
    }

    #[test]
    fn test_broken_xml_is_malformed() {
        let err = Descriptor::load_str("<installation version=\"1.0\">", None).unwrap_err();
        assert!(matches!(err, CompileError::MalformedDescriptor { .. }));
    }

    #[test]
    fn test_require_helpers() {
        let d = Descriptor::load_str(MINIMAL, None).unwrap();
        let pack = d.root.child("packs").unwrap().child("pack").unwrap();
        assert_eq!(d.require_attribute(pack, "name").unwrap(), "core");
        assert!(d.require_yes_no(pack, "required").unwrap());
        assert!(matches!(
            d.require_child(pack, "description"),
            Err(CompileError::MissingRequiredChild { .. })
        ));
        assert!(matches!(
            d.require_u32(pack, "name"),
            Err(CompileError::MissingRequiredAttribute { .. }) | Err(CompileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_yes_no_or_warns_on_garbage() {
        let d = Descriptor::load_str(MINIMAL, None).unwrap();
        let node = DescriptorNode::new("x").with_attribute("flag", "maybe");
        let mut diag = Diagnostics::default();
        assert!(d.yes_no_or(&node, "flag", true, &mut diag));
        assert!(!d.yes_no_or(&node, "absent", false, &mut diag));
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn test_os_constraints() {
        let node = DescriptorNode::new("file")
            .with_attribute("os", "mac")
            .with_child(DescriptorNode::new("os").with_attribute("family", "windows"));
        let os = os_constraints(&node);
        assert_eq!(os.len(), 2);
        assert!(os[0].is_family("windows"));
        assert!(os[1].is_family("mac"));
    }

    #[test]
    fn test_writer_escapes_and_reparses() {
        let node = DescriptorNode::new("langpack")
            .with_attribute("note", "a \"b\" & c")
            .with_child(DescriptorNode::new("str").with_attribute("id", "x").with_text("1 < 2"));
        let xml = write_xml(&node);
        assert!(xml.contains("&quot;b&quot; &amp; c"));
        let back = parse_xml(&xml, None).unwrap();
        assert_eq!(back.attribute("note"), Some("a \"b\" & c"));
        assert_eq!(back.child("str").unwrap().content().as_deref(), Some("1 < 2"));
    }

    #[test]
    fn test_writer_keeps_namespaces_and_mixed_content() {
        let xml = r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="x.xsd"><!-- note --><p xml:lang="de">one <b>two</b> three</p></a>"#;
        let tree = parse_xml(xml, None).unwrap();
        assert_eq!(tree.attribute("xsi:noNamespaceSchemaLocation"), Some("x.xsd"));
        let out = write_xml(&tree);
        assert!(out.contains(r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#));
        assert!(out.contains(r#"xsi:noNamespaceSchemaLocation="x.xsd""#));
        assert!(out.contains(r#"<!-- note --><p xml:lang="de">one <b>two</b> three</p>"#));
        assert!(!out.contains("xmlns:xml"));
        assert_eq!(write_xml(&parse_xml(&out, None).unwrap()), out);
    }

    #[test]
    fn test_prefixed_elements_and_default_namespace() {
        let xml = r#"<r xmlns="urn:a" xmlns:k="urn:k"><k:item k:id="1"/><plain/></r>"#;
        let tree = parse_xml(xml, None).unwrap();
        assert_eq!(tree.namespaces.len(), 2);
        let names: Vec<_> = tree.children().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["k:item", "plain"]);
        assert!(tree.children().all(|c| c.namespaces.is_empty()));
        let out = write_xml(&tree);
        assert!(out.contains(r#"<r xmlns="urn:a" xmlns:k="urn:k"><k:item k:id="1"/><plain/></r>"#));
    }

    #[test]
    fn test_text_joins_runs_around_comments() {
        let tree = parse_xml("<v> a<!--x-->b </v>", None).unwrap();
        assert_eq!(tree.text(), " ab ");
        assert_eq!(tree.content().as_deref(), Some("ab"));
    }
}

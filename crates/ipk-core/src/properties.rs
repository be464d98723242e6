//! Build-time properties and `${name}` substitution over descriptor trees.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use crate::descriptor::{Descriptor, DescriptorNode, XmlContent};
use crate::error::{CompileError, Diagnostics};

/// Name of the element holding property declarations.
pub const PROPERTIES_ELEMENT: &str = "properties";

/// Build-time property table.
///
/// The first definition of a name wins; later definitions are ignored.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    values: BTreeMap<String, String>,
}

impl PropertyTable {
    /// Define `name` unless it already has a value. Returns whether the value was stored.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.values.contains_key(&name) {
            tracing::debug!(%name, "property already set, keeping first value");
            return false;
        }
        self.values.insert(name, value.into());
        true
    }

    /// Replace the value of `name`, whether or not it is set.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// All properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Snapshot as a plain map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }

    /// Expand `${name}` placeholders once. Unknown names are left as they are.
    pub fn substitute<'a>(&self, text: &'a str) -> Cow<'a, str> {
        expand_braced(text, '$', |name| self.get(name))
    }

    /// Substitute every attribute value and text of `root`, leaving the
    /// `<properties>` declarations untouched.
    pub fn substitute_tree(&self, root: &DescriptorNode) -> DescriptorNode {
        DescriptorNode {
            name: root.name.clone(),
            attributes: root
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), self.substitute(v).into_owned()))
                .collect(),
            namespaces: root.namespaces.clone(),
            content: root
                .content
                .iter()
                .map(|c| match c {
                    XmlContent::Element(e) if e.name == PROPERTIES_ELEMENT => c.clone(),
                    XmlContent::Element(e) => XmlContent::Element(self.substitute_tree(e)),
                    XmlContent::Text(t) => XmlContent::Text(self.substitute(t).into_owned()),
                    XmlContent::Comment(_) => c.clone(),
                })
                .collect(),
            line: root.line,
        }
    }
}

/// Expand `<marker>{name}` placeholders in a single pass.
///
/// Replacement text is never rescanned.
pub(crate) fn expand_braced<'a, 'v>(
    text: &'a str,
    marker: char,
    lookup: impl Fn(&str) -> Option<&'v str>,
) -> Cow<'a, str> {
    let open = format!("{marker}{{");
    if !text.contains(&open) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(&open) {
        out.push_str(&rest[..start]);
        let after = &rest[start + open.len()..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + open.len() + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Run the `<properties>` declarations of `descriptor` in document order.
///
/// `env` is the process environment snapshot used by `environment=` imports.
pub fn load_declarations(
    descriptor: &Descriptor,
    table: &mut PropertyTable,
    basedir: &Path,
    env: &[(String, String)],
    diag: &mut Diagnostics,
) -> Result<(), CompileError> {
    let Some(section) = descriptor.root.child(PROPERTIES_ELEMENT) else {
        return Ok(());
    };
    for prop in section.children_named("property") {
        if let Some(name) = prop.attribute("name") {
            let value = if let Some(location) = prop.attribute("location") {
                basedir
                    .join(table.substitute(location).as_ref())
                    .to_string_lossy()
                    .into_owned()
            } else {
                let raw = descriptor.require_attribute(prop, "value")?;
                table.substitute(raw).into_owned()
            };
            table.define(name, value);
        } else if let Some(file) = prop.attribute("file") {
            let path = basedir.join(table.substitute(file).as_ref());
            if !path.is_file() {
                diag.warn(
                    descriptor.at(prop),
                    format!("property file {} not found", path.display()),
                );
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                CompileError::io(descriptor.at(prop), format!("reading {}", path.display()), e)
            })?;
            let prefix = prop.attribute("prefix").map(dotted_prefix);
            for (key, value) in parse_properties(&content) {
                let value = table.substitute(&value).into_owned();
                match &prefix {
                    Some(p) => table.define(format!("{p}{key}"), value),
                    None => table.define(key, value),
                };
            }
        } else if let Some(prefix) = prop.attribute("environment") {
            let prefix = dotted_prefix(prefix);
            for (key, value) in env {
                table.define(format!("{prefix}{key}"), value.clone());
            }
        } else {
            return Err(CompileError::MissingRequiredAttribute {
                at: descriptor.at(prop),
                element: prop.name.clone(),
                attribute: "name, file or environment".into(),
            });
        }
    }
    Ok(())
}

fn dotted_prefix(prefix: &str) -> String {
    if prefix.ends_with('.') {
        prefix.to_string()
    } else {
        format!("{prefix}.")
    }
}

/// Parse a flat `key=value` properties file.
///
/// Supports `#`/`!` comments, `=`, `:` or whitespace separators, trailing
/// backslash continuation and the usual backslash escapes.
pub fn parse_properties(content: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut logical = String::new();
    for raw in content.lines() {
        let line = raw.trim_start();
        let comment = line.is_empty() || line.starts_with('#') || line.starts_with('!');
        if logical.is_empty() && comment {
            continue;
        }
        let continued = line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1;
        if continued {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);
        entries.push(split_entry(&logical));
        logical.clear();
    }
    if !logical.is_empty() {
        entries.push(split_entry(&logical));
    }
    entries
}

fn split_entry(line: &str) -> (String, String) {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }
    let key = &line[..key_end];
    let mut value = line[key_end..].trim_start();
    if let Some(stripped) = value.strip_prefix(['=', ':']) {
        value = stripped.trim_start();
    }
    (unescape(key), unescape(value))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(pairs: &[(&str, &str)]) -> PropertyTable {
        let mut t = PropertyTable::default();
        for (k, v) in pairs {
            t.define(*k, *v);
        }
        t
    }

    #[test]
    fn test_first_writer_wins() {
        let mut t = PropertyTable::default();
        assert!(t.define("a", "1"));
        assert!(!t.define("a", "2"));
        assert_eq!(t.get("a"), Some("1"));
    }

    #[test]
    fn test_substitute_leaves_unknown_verbatim() {
        let t = table(&[("name", "demo")]);
        assert_eq!(t.substitute("${name}-${missing}-${"), "demo-${missing}-${");
        assert!(matches!(t.substitute("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_substitute_single_pass() {
        let t = table(&[("loop", "${loop}"), ("a", "${b}"), ("b", "x")]);
        assert_eq!(t.substitute("${loop}"), "${loop}");
        assert_eq!(t.substitute("${a}"), "${b}");
    }

    #[test]
    fn test_tree_substitution_skips_properties() {
        let t = table(&[("v", "1.2")]);
        let root = DescriptorNode::new("installation")
            .with_child(
                DescriptorNode::new("properties").with_child(
                    DescriptorNode::new("property")
                        .with_attribute("name", "x")
                        .with_attribute("value", "${v}"),
                ),
            )
            .with_child(DescriptorNode::new("appversion").with_text("${v}"));
        let out = t.substitute_tree(&root);
        assert_eq!(out.child("appversion").unwrap().text(), "1.2");
        let decl = out.child("properties").unwrap().child("property").unwrap();
        assert_eq!(decl.attribute("value"), Some("${v}"));

        // Second pass changes nothing.
        assert_eq!(t.substitute_tree(&out), out);
    }

    #[test]
    fn test_declarations_in_document_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("build.properties"), "ver=2.0\n# c\nname = from-file\n").unwrap();
        let xml = r#"<installation version="1.0"><properties>
            <property name="name" value="first"/>
            <property file="build.properties"/>
            <property file="build.properties" prefix="b"/>
            <property name="full" value="${name}-${ver}"/>
            <property environment="env"/>
        </properties></installation>"#;
        let d = Descriptor::load_str(xml, None).unwrap();
        let mut t = PropertyTable::default();
        let env = vec![("HOME".to_string(), "/home/u".to_string())];
        let mut diag = Diagnostics::default();
        load_declarations(&d, &mut t, dir.path(), &env, &mut diag).unwrap();
        assert_eq!(t.get("name"), Some("first"));
        assert_eq!(t.get("b.name"), Some("from-file"));
        assert_eq!(t.get("full"), Some("first-2.0"));
        assert_eq!(t.get("env.HOME"), Some("/home/u"));
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn test_missing_property_file_warns() {
        let dir = TempDir::new().unwrap();
        let xml = r#"<installation version="1.0"><properties><property file="nope"/></properties></installation>"#;
        let d = Descriptor::load_str(xml, None).unwrap();
        let mut diag = Diagnostics::default();
        load_declarations(&d, &mut PropertyTable::default(), dir.path(), &[], &mut diag).unwrap();
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn test_parse_properties_syntax() {
        let parsed = parse_properties("a=1\nb: two\nc three\nlong = x\\\n   y\nesc\\=key=v\\u0041\n! bang\n");
        assert_eq!(
            parsed,
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "two".into()),
                ("c".into(), "three".into()),
                ("long".into(), "xy".into()),
                ("esc=key".into(), "vA".into()),
            ]
        );
    }
}

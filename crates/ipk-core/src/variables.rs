//! Install-time variables.
//!
//! Static variables are a plain name/value table; dynamic variables keep an
//! ordered candidate list per name. The [`VariableSubstitutor`] expands
//! variable references in resources with the syntax of each
//! [`SubstitutionType`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use ipk_schema::{DynamicVariable, SubstitutionType};

use crate::descriptor::Descriptor;
use crate::error::{CompileError, Diagnostics};

/// Result of adding a candidate to a dynamic variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicMerge {
    /// The candidate was new.
    Added,
    /// An equal candidate existed; it was removed and the new one appended.
    Replaced,
}

/// Append `var` to its candidate list, replacing an equal candidate.
///
/// Candidates are equal when name, value and condition all match. The
/// replacement moves to the end of the list.
pub fn merge_dynamic_variable(
    table: &mut BTreeMap<String, Vec<DynamicVariable>>,
    var: DynamicVariable,
) -> DynamicMerge {
    let list = table.entry(var.name.clone()).or_default();
    let before = list.len();
    list.retain(|existing| existing != &var);
    let outcome = if list.len() == before {
        DynamicMerge::Added
    } else {
        DynamicMerge::Replaced
    };
    list.push(var);
    outcome
}

/// Read `<variables>` into `table`. Redefinitions overwrite with a warning.
pub fn add_variables(
    descriptor: &Descriptor,
    table: &mut BTreeMap<String, String>,
    diag: &mut Diagnostics,
) -> Result<(), CompileError> {
    let Some(section) = descriptor.root.child("variables") else {
        return Ok(());
    };
    for node in section.children_named("variable") {
        let name = descriptor.require_attribute(node, "name")?;
        let value = descriptor.require_attribute(node, "value")?;
        if let Some(old) = table.insert(name.to_string(), value.to_string()) {
            diag.warn(
                descriptor.at(node),
                format!("variable '{name}' defined more than once, replacing '{old}'"),
            );
        }
    }
    Ok(())
}

/// Read `<dynamicvariables>` into `table`.
pub fn add_dynamic_variables(
    descriptor: &Descriptor,
    table: &mut BTreeMap<String, Vec<DynamicVariable>>,
    diag: &mut Diagnostics,
) -> Result<(), CompileError> {
    let Some(section) = descriptor.root.child("dynamicvariables") else {
        return Ok(());
    };
    for node in section.children_named("variable") {
        let name = descriptor.require_attribute(node, "name")?;
        let value = match node.attribute("value") {
            Some(v) => v.to_string(),
            None => {
                let child = descriptor.require_child(node, "value")?;
                descriptor.require_content(child)?.to_string()
            }
        };
        let var = DynamicVariable {
            name: name.to_string(),
            value,
            condition: node.attribute("condition").map(str::to_string),
        };
        if merge_dynamic_variable(table, var) == DynamicMerge::Replaced {
            diag.warn(
                descriptor.at(node),
                format!("dynamic variable '{name}' with the same value and condition defined twice, overwriting"),
            );
        }
    }
    Ok(())
}

/// Expands variable references in resource text.
pub struct VariableSubstitutor<'a> {
    variables: &'a BTreeMap<String, String>,
}

impl<'a> VariableSubstitutor<'a> {
    /// Substitutor over `variables`.
    pub fn new(variables: &'a BTreeMap<String, String>) -> Self {
        Self { variables }
    }

    /// Expand references once. Unknown names are kept verbatim.
    pub fn substitute<'t>(&self, text: &'t str, kind: SubstitutionType) -> Cow<'t, str> {
        match kind {
            SubstitutionType::Plain => self.expand_marked(text, '$', |v| Cow::Borrowed(v)),
            SubstitutionType::JavaProperties => {
                self.expand_marked(text, '$', |v| Cow::Owned(escape_property(v)))
            }
            SubstitutionType::Xml => self.expand_marked(text, '$', |v| Cow::Owned(escape_xml(v))),
            SubstitutionType::Shell => self.expand_marked(text, '%', |v| Cow::Borrowed(v)),
            SubstitutionType::At | SubstitutionType::Ant => self.expand_delimited(text, '@'),
        }
    }

    // `<m>{name}` or `<m>name`.
    fn expand_marked<'t>(
        &self,
        text: &'t str,
        marker: char,
        encode: impl Fn(&str) -> Cow<'_, str>,
    ) -> Cow<'t, str> {
        if !text.contains(marker) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(marker) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + marker.len_utf8()..];
            let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
                match inner.find('}') {
                    Some(end) => (&inner[..end], end + 2),
                    None => ("", 0),
                }
            } else {
                let end = after
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            };
            match self.variables.get(name).filter(|_| !name.is_empty()) {
                Some(value) => {
                    out.push_str(&encode(value));
                    rest = &after[consumed..];
                }
                None => {
                    out.push(marker);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Cow::Owned(out)
    }

    // `<d>name<d>`.
    fn expand_delimited<'t>(&self, text: &'t str, delim: char) -> Cow<'t, str> {
        if !text.contains(delim) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(delim) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + delim.len_utf8()..];
            let hit = after
                .find(delim)
                .and_then(|end| self.variables.get(&after[..end]).map(|v| (v, end)));
            match hit {
                Some((value, end)) => {
                    out.push_str(value);
                    rest = &after[end + delim.len_utf8()..];
                }
                None => {
                    out.push(delim);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Cow::Owned(out)
    }
}

fn escape_property(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dv(name: &str, value: &str, condition: Option<&str>) -> DynamicVariable {
        DynamicVariable {
            name: name.into(),
            value: value.into(),
            condition: condition.map(str::to_string),
        }
    }

    #[test]
    fn test_dynamic_merge_replaces_equal_candidate() {
        let mut table = BTreeMap::new();
        assert_eq!(merge_dynamic_variable(&mut table, dv("x", "1", Some("c1"))), DynamicMerge::Added);
        assert_eq!(merge_dynamic_variable(&mut table, dv("x", "2", Some("c2"))), DynamicMerge::Added);
        assert_eq!(merge_dynamic_variable(&mut table, dv("x", "1", None)), DynamicMerge::Added);
        assert_eq!(
            merge_dynamic_variable(&mut table, dv("x", "1", Some("c1"))),
            DynamicMerge::Replaced
        );
        let values: Vec<_> = table["x"].iter().map(|v| (v.value.as_str(), v.condition.as_deref())).collect();
        assert_eq!(values, [("2", Some("c2")), ("1", None), ("1", Some("c1"))]);
    }

    #[test]
    fn test_static_variables_overwrite_with_warning() {
        let xml = r#"<installation version="1.0"><variables>
            <variable name="a" value="1"/>
            <variable name="a" value="2"/>
        </variables></installation>"#;
        let d = Descriptor::load_str(xml, None).unwrap();
        let mut table = BTreeMap::new();
        let mut diag = Diagnostics::default();
        add_variables(&d, &mut table, &mut diag).unwrap();
        assert_eq!(table["a"], "2");
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn test_dynamic_value_from_child() {
        let xml = r#"<installation version="1.0"><dynamicvariables>
            <variable name="dir" condition="isWin"><value>C:\apps</value></variable>
            <variable name="dir"/>
        </dynamicvariables></installation>"#;
        let d = Descriptor::load_str(xml, None).unwrap();
        let mut table = BTreeMap::new();
        let err = add_dynamic_variables(&d, &mut table, &mut Diagnostics::default()).unwrap_err();
        assert!(matches!(err, CompileError::MissingRequiredChild { .. }));
        assert_eq!(table["dir"][0].value, "C:\\apps");
    }

    #[test]
    fn test_substitution_syntaxes() {
        let vars = BTreeMap::from([
            ("APP".to_string(), "demo".to_string()),
            ("PATH".to_string(), "a=b & <c>".to_string()),
        ]);
        let s = VariableSubstitutor::new(&vars);
        assert_eq!(s.substitute("${APP}/$APP/$NOPE/${NOPE}", SubstitutionType::Plain), "demo/demo/$NOPE/${NOPE}");
        assert_eq!(s.substitute("p=${PATH}", SubstitutionType::JavaProperties), "p=a\\=b & <c>");
        assert_eq!(s.substitute("<v>$PATH</v>", SubstitutionType::Xml), "<v>a=b &amp; &lt;c&gt;</v>");
        assert_eq!(s.substitute("%{APP} %APP $APP", SubstitutionType::Shell), "demo demo $APP");
        assert_eq!(s.substitute("@APP@ user@host @X@", SubstitutionType::At), "demo user@host @X@");
        assert!(matches!(s.substitute("nothing", SubstitutionType::Ant), Cow::Borrowed(_)));
    }
}

//! Parsing and registration of `<conditions>`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use ipk_schema::{Condition, OsConstraint, Rule};

use crate::descriptor::{Descriptor, DescriptorNode};
use crate::error::{CompileError, Diagnostics};

/// Parse one `<condition>` element.
///
/// Markup that does not describe a known rule is warned about and yields `None`.
pub fn parse_condition(
    descriptor: &Descriptor,
    node: &DescriptorNode,
    diag: &mut Diagnostics,
) -> Option<Condition> {
    let Some(id) = node.attribute("id").filter(|id| !id.is_empty()) else {
        diag.warn(descriptor.at(node), "condition without id ignored");
        return None;
    };
    match parse_rule(node) {
        Ok(rule) => Some(Condition {
            id: id.to_string(),
            rule,
        }),
        Err(reason) => {
            diag.warn(descriptor.at(node), format!("condition '{id}' ignored: {reason}"));
            None
        }
    }
}

fn parse_rule(node: &DescriptorNode) -> Result<Rule, String> {
    let kind = node
        .attribute("type")
        .ok_or_else(|| "missing 'type' attribute".to_string())?;
    let content = |name: &str| -> Result<String, String> {
        node.child(name)
            .and_then(DescriptorNode::content)
            .map(Cow::into_owned)
            .ok_or_else(|| format!("<{name}> is required for type '{kind}'"))
    };
    let rule = match kind.to_ascii_lowercase().as_str() {
        "variable" => Rule::Variable {
            name: content("name")?,
            value: content("value")?,
        },
        "packselection" => Rule::PackSelection {
            pack_id: content("name")?,
        },
        "ref" => Rule::Ref {
            id: node
                .attribute("refid")
                .map(str::to_string)
                .ok_or_else(|| "missing 'refid' attribute".to_string())?,
        },
        "os" => {
            let opt = |name: &str| node.child(name).and_then(DescriptorNode::content).map(Cow::into_owned);
            Rule::Os(OsConstraint {
                family: opt("family"),
                name: opt("name"),
                version: opt("version"),
                arch: opt("arch"),
                jre: opt("jre"),
            })
        }
        "and" => Rule::And { rules: parse_operands(node, 1)? },
        "or" => Rule::Or { rules: parse_operands(node, 1)? },
        "xor" => Rule::Xor { rules: parse_operands(node, 2)? },
        "not" => {
            let mut rules = parse_operands(node, 1)?;
            if rules.len() != 1 {
                return Err("'not' takes exactly one operand".into());
            }
            Rule::Not {
                rule: Box::new(rules.remove(0)),
            }
        }
        "exists" => {
            if let Some(name) = node.child("variable").and_then(DescriptorNode::content) {
                Rule::VariableExists { name: name.to_string() }
            } else if let Some(path) = node.child("file").and_then(DescriptorNode::content) {
                Rule::FileExists { path: path.to_string() }
            } else {
                return Err("<variable> or <file> is required for type 'exists'".into());
            }
        }
        other => return Err(format!("unknown condition type '{other}'")),
    };
    Ok(rule)
}

fn parse_operands(node: &DescriptorNode, min: usize) -> Result<Vec<Rule>, String> {
    let rules = node
        .children_named("condition")
        .map(parse_rule)
        .collect::<Result<Vec<_>, _>>()?;
    if rules.len() < min {
        return Err(format!(
            "'{}' needs at least {min} nested condition(s)",
            node.attribute_or("type", "?")
        ));
    }
    Ok(rules)
}

/// Register `condition`, returning the definition it replaced.
pub fn register_condition(
    table: &mut BTreeMap<String, Condition>,
    condition: Condition,
) -> Option<Condition> {
    table.insert(condition.id.clone(), condition)
}

/// Parse `<conditions>` into `table`. Redefined ids keep the last definition.
pub fn add_conditions(
    descriptor: &Descriptor,
    table: &mut BTreeMap<String, Condition>,
    diag: &mut Diagnostics,
) -> Result<(), CompileError> {
    let Some(section) = descriptor.root.child("conditions") else {
        return Ok(());
    };
    for node in section.children_named("condition") {
        let Some(condition) = parse_condition(descriptor, node, diag) else {
            continue;
        };
        let id = condition.id.clone();
        if register_condition(table, condition).is_some() {
            diag.warn(
                descriptor.at(node),
                format!("condition '{id}' defined more than once, using the last definition"),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(body: &str) -> Descriptor {
        Descriptor::load_str(
            &format!(r#"<installation version="1.0"><conditions>{body}</conditions></installation>"#),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_id_keeps_last_and_warns_once() {
        let d = load(
            r#"<condition type="variable" id="c"><name>a</name><value>1</value></condition>
               <condition type="variable" id="c"><name>a</name><value>2</value></condition>"#,
        );
        let mut table = BTreeMap::new();
        let mut diag = Diagnostics::default();
        add_conditions(&d, &mut table, &mut diag).unwrap();
        assert_eq!(table.len(), 1);
        assert!(matches!(&table["c"].rule, Rule::Variable { value, .. } if value == "2"));
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn test_invalid_markup_is_skipped_with_warning() {
        let d = load(
            r#"<condition type="teleport" id="x"/>
               <condition type="variable" id="y"><name>a</name></condition>
               <condition type="packselection" id="z"><name>core</name></condition>"#,
        );
        let mut table = BTreeMap::new();
        let mut diag = Diagnostics::default();
        add_conditions(&d, &mut table, &mut diag).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), ["z"]);
        assert_eq!(diag.warnings().len(), 2);
    }

    #[test]
    fn test_nested_composition() {
        let d = load(
            r#"<condition type="and" id="both">
                 <condition type="ref" refid="isWin"/>
                 <condition type="not"><condition type="exists"><variable>SKIP</variable></condition></condition>
               </condition>
               <condition type="os" id="isWin"><family>windows</family></condition>"#,
        );
        let mut table = BTreeMap::new();
        add_conditions(&d, &mut table, &mut Diagnostics::default()).unwrap();
        let Rule::And { rules } = &table["both"].rule else {
            panic!("expected and");
        };
        assert_eq!(rules.len(), 2);
        assert_eq!(table["both"].rule.references(), ["isWin"]);
        assert!(matches!(&table["isWin"].rule, Rule::Os(os) if os.is_family("windows")));
    }
}

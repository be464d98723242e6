//! Declared conditions and their rule trees.
//!
//! Conditions are only parsed and registered at build time; the installer
//! runtime evaluates them. [`Rule::evaluate`] is provided so tooling can check
//! a rule against a known environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::os::OsConstraint;

/// Reference chains deeper than this evaluate to false.
const MAX_REF_DEPTH: usize = 32;

/// A named rule, referenced by id from packs, panels, files and variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Unique id.
    pub id: String,
    /// The rule tree.
    pub rule: Rule,
}

/// A condition rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Rule {
    /// A variable equals a value.
    Variable {
        /// Variable name.
        name: String,
        /// Expected value.
        value: String,
    },
    /// A pack is selected for installation.
    PackSelection {
        /// Pack id.
        pack_id: String,
    },
    /// The target system matches an OS constraint.
    Os(OsConstraint),
    /// Another condition, by id.
    Ref {
        /// Referenced condition id.
        id: String,
    },
    /// All operands hold.
    And {
        /// Operands.
        rules: Vec<Rule>,
    },
    /// At least one operand holds.
    Or {
        /// Operands.
        rules: Vec<Rule>,
    },
    /// Exactly one operand holds.
    Xor {
        /// Operands.
        rules: Vec<Rule>,
    },
    /// The operand does not hold.
    Not {
        /// Operand.
        rule: Box<Rule>,
    },
    /// A variable is defined.
    VariableExists {
        /// Variable name.
        name: String,
    },
    /// A file exists on the target system.
    FileExists {
        /// File path.
        path: String,
    },
}

/// What a rule needs to know about the target system.
pub trait ConditionEnv {
    /// Current value of an install-time variable.
    fn variable(&self, name: &str) -> Option<String>;

    /// Whether the pack with `id` is selected.
    fn is_pack_selected(&self, id: &str) -> bool;

    /// Whether the running system satisfies `constraint`.
    fn matches_os(&self, constraint: &OsConstraint) -> bool;

    /// Look up a condition by id.
    fn condition(&self, id: &str) -> Option<&Condition>;

    /// Whether `path` exists.
    fn file_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

impl Rule {
    /// Evaluate the rule.
    ///
    /// Unknown references and cycles deeper than an internal limit evaluate
    /// to false.
    pub fn evaluate(&self, env: &dyn ConditionEnv) -> bool {
        self.evaluate_at(env, 0)
    }

    fn evaluate_at(&self, env: &dyn ConditionEnv, depth: usize) -> bool {
        match self {
            Rule::Variable { name, value } => env.variable(name).is_some_and(|v| v == *value),
            Rule::PackSelection { pack_id } => env.is_pack_selected(pack_id),
            Rule::Os(constraint) => env.matches_os(constraint),
            Rule::Ref { id } => {
                if depth >= MAX_REF_DEPTH {
                    return false;
                }
                env.condition(id)
                    .is_some_and(|c| c.rule.evaluate_at(env, depth + 1))
            }
            Rule::And { rules } => rules.iter().all(|r| r.evaluate_at(env, depth)),
            Rule::Or { rules } => rules.iter().any(|r| r.evaluate_at(env, depth)),
            Rule::Xor { rules } => {
                rules.iter().filter(|r| r.evaluate_at(env, depth)).count() == 1
            }
            Rule::Not { rule } => !rule.evaluate_at(env, depth),
            Rule::VariableExists { name } => env.variable(name).is_some(),
            Rule::FileExists { path } => env.file_exists(path),
        }
    }

    /// Ids of conditions referenced anywhere in this rule tree.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Rule::Ref { id } => out.push(id),
            Rule::And { rules } | Rule::Or { rules } | Rule::Xor { rules } => {
                for rule in rules {
                    rule.collect_references(out);
                }
            }
            Rule::Not { rule } => rule.collect_references(out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Env {
        vars: HashMap<String, String>,
        selected: Vec<String>,
        conditions: Vec<Condition>,
    }

    impl ConditionEnv for Env {
        fn variable(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }
        fn is_pack_selected(&self, id: &str) -> bool {
            self.selected.iter().any(|s| s == id)
        }
        fn matches_os(&self, constraint: &OsConstraint) -> bool {
            constraint.is_family("unix")
        }
        fn condition(&self, id: &str) -> Option<&Condition> {
            self.conditions.iter().find(|c| c.id == id)
        }
        fn file_exists(&self, _path: &str) -> bool {
            false
        }
    }

    fn var(name: &str, value: &str) -> Rule {
        Rule::Variable {
            name: name.into(),
            value: value.into(),
        }
    }

    fn env() -> Env {
        Env {
            vars: HashMap::from([("mode".to_string(), "full".to_string())]),
            selected: vec!["core".into()],
            conditions: vec![
                Condition {
                    id: "is.full".into(),
                    rule: var("mode", "full"),
                },
                Condition {
                    id: "loop".into(),
                    rule: Rule::Ref { id: "loop".into() },
                },
            ],
        }
    }

    #[test]
    fn test_composition() {
        let env = env();
        let rule = Rule::And {
            rules: vec![
                Rule::Ref {
                    id: "is.full".into(),
                },
                Rule::PackSelection {
                    pack_id: "core".into(),
                },
                Rule::Not {
                    rule: Box::new(Rule::Os(OsConstraint::family("windows"))),
                },
            ],
        };
        assert!(rule.evaluate(&env));

        let xor = Rule::Xor {
            rules: vec![var("mode", "full"), Rule::VariableExists { name: "mode".into() }],
        };
        assert!(!xor.evaluate(&env));
    }

    #[test]
    fn test_reference_cycle_evaluates_false() {
        let env = env();
        assert!(!Rule::Ref { id: "loop".into() }.evaluate(&env));
        assert!(!Rule::Ref { id: "missing".into() }.evaluate(&env));
    }

    #[test]
    fn test_references_are_collected() {
        let rule = Rule::Or {
            rules: vec![
                Rule::Ref { id: "a".into() },
                Rule::Not {
                    rule: Box::new(Rule::Ref { id: "b".into() }),
                },
            ],
        };
        assert_eq!(rule.references(), ["a", "b"]);
    }

    #[test]
    fn test_rule_serializes_tagged() {
        let json = serde_json::to_string(&Rule::Ref { id: "a".into() }).unwrap();
        assert_eq!(json, r#"{"type":"ref","id":"a"}"#);
    }
}

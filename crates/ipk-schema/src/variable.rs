use serde::{Deserialize, Serialize};

/// One candidate value of a variable resolved at install time.
///
/// All candidates sharing a name form an ordered list; the installer picks
/// the first whose condition holds. Two candidates are the same entry when
/// name, value and condition are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicVariable {
    /// Variable name.
    pub name: String,
    /// Value expression.
    pub value: String,
    /// Condition selecting this candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

use serde::{Deserialize, Serialize};

/// Restricts an entity (pack, file, panel, ...) to matching target systems.
///
/// Every field is optional; an unset field matches anything. A list of
/// constraints is satisfied when any single entry matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsConstraint {
    /// OS family (`windows`, `unix`, `mac`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Exact OS name as reported by the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// OS version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// CPU architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Runtime version constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jre: Option<String>,
}

impl OsConstraint {
    /// Constraint matching a whole OS family.
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: Some(family.into()),
            ..Self::default()
        }
    }

    /// Returns true when this constraint pins exactly the given family.
    pub fn is_family(&self, family: &str) -> bool {
        self.family
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(family))
    }
}

/// Returns true when `constraints` explicitly mention `family`.
pub fn mentions_family(constraints: &[OsConstraint], family: &str) -> bool {
    constraints.iter().any(|c| c.is_family(family))
}

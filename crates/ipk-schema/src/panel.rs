use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::os::OsConstraint;
use crate::pack::PolicyError;

/// Point in a panel's lifecycle at which an action hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStage {
    /// Before the panel is constructed.
    PreConstruct,
    /// Before the panel is shown.
    PreActivate,
    /// Before the panel input is validated.
    PreValidate,
    /// After the panel input is validated.
    PostValidate,
}

impl FromStr for ActionStage {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Stage keywords are matched exactly.
        match s {
            "preconstruct" => Ok(Self::PreConstruct),
            "preactivate" => Ok(Self::PreActivate),
            "prevalidate" => Ok(Self::PreValidate),
            "postvalidate" => Ok(Self::PostValidate),
            _ => Err(PolicyError::InvalidValue {
                attribute: "stage",
                value: s.to_string(),
            }),
        }
    }
}

/// A panel action hook with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelAction {
    /// Action class name.
    pub class_name: String,
    /// Configuration key/values.
    pub configuration: BTreeMap<String, String>,
}

/// One page of the installation wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Panel {
    /// Fully-qualified class name when it could be resolved, else as declared.
    pub class_name: String,
    /// Explicit panel id.
    pub id: Option<String>,
    /// Target OS constraints.
    pub os: Vec<OsConstraint>,
    /// Condition gating the panel.
    pub condition: Option<String>,
    /// Configuration key/values.
    pub configuration: BTreeMap<String, String>,
    /// Data validator class name.
    pub validator: Option<String>,
    /// Help resource ids keyed by ISO3 locale code.
    pub help: BTreeMap<String, String>,
    /// Action hooks per stage, in declaration order.
    pub actions: BTreeMap<ActionStage, Vec<PanelAction>>,
}

impl Panel {
    /// Append an action hook to `stage`.
    pub fn add_action(&mut self, stage: ActionStage, action: PanelAction) {
        self.actions.entry(stage).or_default().push(action);
    }

    /// Action hooks registered for `stage`.
    pub fn actions_for(&self, stage: ActionStage) -> &[PanelAction] {
        self.actions.get(&stage).map_or(&[], Vec::as_slice)
    }
}

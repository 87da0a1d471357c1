//! Command plans recovered from gated payloads.
//!
//! The plaintext of a payload is a JSON document:
//!
//! ```json
//! {"steps": [{"verb": "getvar", "name": "unlocked"}, {"verb": "oem-unlock"}]}
//! ```
//!
//! Steps are restricted to the verbs the channels expose; anything else is
//! rejected when the plan is parsed, before a single step runs.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::channel::ChannelKind;
use crate::error::{BridgeError, Result};

/// One device command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[serde(tag = "verb", rename_all = "kebab-case", deny_unknown_fields)]
pub enum PlanStep {
    /// Bootloader: `getvar <name>`.
    Getvar {
        /// Variable name.
        name: String,
    },
    /// Bootloader: `oem unlock`.
    OemUnlock,
    /// Bootloader: `oem edl`.
    OemEdl,
    /// Bootloader: `reboot edl`.
    RebootEdl,
    /// Shell: `shell <command>`.
    Shell {
        /// Command line run on the device.
        command: String,
    },
    /// Shell: `reboot [mode]`.
    Reboot {
        /// Optional reboot target.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
}

impl PlanStep {
    /// Channel this step runs on.
    pub fn channel(&self) -> ChannelKind {
        match self {
            PlanStep::Getvar { .. } | PlanStep::OemUnlock | PlanStep::OemEdl | PlanStep::RebootEdl => {
                ChannelKind::Bootloader
            }
            PlanStep::Shell { .. } | PlanStep::Reboot { .. } => ChannelKind::Shell,
        }
    }

    /// Arguments passed to the channel.
    pub fn args(&self) -> Vec<&str> {
        match self {
            PlanStep::Getvar { name } => vec!["getvar", name.as_str()],
            PlanStep::OemUnlock => vec!["oem", "unlock"],
            PlanStep::OemEdl => vec!["oem", "edl"],
            PlanStep::RebootEdl => vec!["reboot", "edl"],
            PlanStep::Shell { command } => vec!["shell", command.as_str()],
            PlanStep::Reboot { mode: Some(mode) } => vec!["reboot", mode.as_str()],
            PlanStep::Reboot { mode: None } => vec!["reboot"],
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let field = match self {
            PlanStep::Getvar { name } => Some(("name", name)),
            PlanStep::Shell { command } => Some(("command", command)),
            PlanStep::Reboot { mode: Some(mode) } => Some(("mode", mode)),
            _ => None,
        };
        match field {
            Some((key, value)) if value.trim().is_empty() => Err(format!("empty {}", key)),
            _ => Ok(()),
        }
    }
}

/// An ordered sequence of device commands.
///
/// Plans come from decrypted payloads, so their contents are wiped on drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct CommandPlan {
    steps: Vec<PlanStep>,
}

impl CommandPlan {
    /// Builds a plan from steps, validating them.
    pub fn new(steps: Vec<PlanStep>) -> Result<Self> {
        let plan = Self { steps };
        plan.validate()?;
        Ok(plan)
    }

    /// Parses and validates a plan from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let plan: CommandPlan =
            serde_json::from_slice(bytes).map_err(|e| BridgeError::InvalidPlan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Serializes the plan to JSON, in a buffer wiped on drop.
    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| BridgeError::InvalidPlan(e.to_string()))
    }

    /// The steps, in execution order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(BridgeError::InvalidPlan("plan has no steps".to_string()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|reason| BridgeError::InvalidPlan(format!("step {}: {}", index, reason)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let plan = CommandPlan::from_json(
            br#"{"steps":[{"verb":"getvar","name":"unlocked"},{"verb":"oem-unlock"},{"verb":"reboot","mode":"bootloader"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[0].args(), vec!["getvar", "unlocked"]);
        assert_eq!(plan.steps()[1].channel(), ChannelKind::Bootloader);
        assert_eq!(plan.steps()[2].channel(), ChannelKind::Shell);
        assert_eq!(plan.steps()[2].args(), vec!["reboot", "bootloader"]);
    }

    #[test]
    fn test_unknown_verb_rejected() {
        let err = CommandPlan::from_json(br#"{"steps":[{"verb":"flash","partition":"boot"}]}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPlan(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CommandPlan::from_json(br#"{"steps":[{"verb":"oem-edl"}],"note":"x"}"#).is_err());
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(CommandPlan::from_json(br#"{"steps":[]}"#).is_err());
        assert!(CommandPlan::new(Vec::new()).is_err());
    }

    #[test]
    fn test_blank_arguments_rejected() {
        let err = CommandPlan::new(vec![
            PlanStep::OemEdl,
            PlanStep::Shell {
                command: "  ".to_string(),
            },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid command plan: step 1: empty command");
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(CommandPlan::from_json(b"\x00\x01garbage").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let plan = CommandPlan::new(vec![
            PlanStep::RebootEdl,
            PlanStep::Reboot { mode: None },
        ])
        .unwrap();
        let json = plan.to_json().unwrap();
        assert_eq!(
            json.as_slice(),
            br#"{"steps":[{"verb":"reboot-edl"},{"verb":"reboot"}]}"#
        );
        assert_eq!(CommandPlan::from_json(&json).unwrap(), plan);
    }
}

//! Credential-gated device operations.
//!
//! A gated operation carries a sealed [`GatedPayload`] whose plaintext is a
//! [`CommandPlan`]. Nothing is sent to a device until the operator's
//! credential has been validated and the payload has authenticated under it:
//!
//! ```text
//! Idle -> CredentialSupplied -> Decrypting -> Decrypted -> Executing -> Succeeded
//!   \            \                  \             \            \
//!    `------------`------------------`-------------`------------`--> Failed
//! ```
//!
//! Every entered state is recorded in the [`OperationResult`] trace. Refusals
//! are outcomes, not errors: `run` always returns a result.

pub mod payloads;
pub mod plan;

use std::fmt;
use std::str::FromStr;

use gate::{Credential, GateError, GatedPayload};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::channel::transport::Transport;
use crate::channel::{Channel, ChannelKind};
use crate::devices::DeviceLease;
use crate::error::{BridgeError, Result};

pub use payloads::{load_payload_file, payload_for};
pub use plan::{CommandPlan, PlanStep};

/// Operations that require a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Unlock the bootloader of a unit in flashing mode.
    BootloaderUnlock,
    /// Vendor-specific unlock sequence over the shell channel.
    VendorUnlock,
}

impl OperationKind {
    /// All operations, in display order.
    pub const ALL: [OperationKind; 2] = [
        OperationKind::BootloaderUnlock,
        OperationKind::VendorUnlock,
    ];

    /// Command-line name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::BootloaderUnlock => "bootloader-unlock",
            OperationKind::VendorUnlock => "vendor-unlock",
        }
    }

    /// Associated data every payload for this operation is sealed with.
    pub fn context(&self) -> Vec<u8> {
        format!("devbridge:{}", self.name()).into_bytes()
    }

    /// Channel the target device is selected from.
    pub fn target_channel(&self) -> ChannelKind {
        match self {
            OperationKind::BootloaderUnlock => ChannelKind::Bootloader,
            OperationKind::VendorUnlock => ChannelKind::Shell,
        }
    }

    /// The payload shipped with the binary.
    pub fn bundled_payload(&self) -> GatedPayload {
        payloads::bundled(*self)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| BridgeError::UnknownOperation(s.to_string()))
    }
}

/// States of a gated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    CredentialSupplied,
    Decrypting,
    Decrypted,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::Idle => "idle",
            GateState::CredentialSupplied => "credential-supplied",
            GateState::Decrypting => "decrypting",
            GateState::Decrypted => "decrypted",
            GateState::Executing => "executing",
            GateState::Succeeded => "succeeded",
            GateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a gated run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    MissingCredential,
    InvalidCredential,
    PayloadCorrupt,
    AuthenticationFailed,
    /// The payload authenticated but its plaintext is not a command plan, or
    /// the plan reaches a channel other than the leased device's.
    PlanInvalid,
    /// Step `index` of the plan failed; earlier steps are not rolled back.
    StepFailed {
        index: usize,
    },
}

impl From<&GateError> for FailureReason {
    fn from(err: &GateError) -> Self {
        match err {
            GateError::MissingCredential => FailureReason::MissingCredential,
            GateError::InvalidCredential(_) => FailureReason::InvalidCredential,
            GateError::PayloadCorrupt { .. } => FailureReason::PayloadCorrupt,
            GateError::AuthenticationFailed
            | GateError::Encryption(_)
            | GateError::PayloadEncoding(_) => FailureReason::AuthenticationFailed,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingCredential => f.write_str("missing credential"),
            FailureReason::InvalidCredential => f.write_str("invalid credential"),
            FailureReason::PayloadCorrupt => f.write_str("payload corrupt"),
            FailureReason::AuthenticationFailed => f.write_str("authentication failed"),
            FailureReason::PlanInvalid => f.write_str("invalid command plan"),
            FailureReason::StepFailed { index } => write!(f, "step {} failed", index),
        }
    }
}

/// The last step a run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    Credential,
    Payload,
    Plan,
    /// Index into the command plan.
    Command(usize),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Credential => f.write_str("credential"),
            StepId::Payload => f.write_str("payload"),
            StepId::Plan => f.write_str("plan"),
            StepId::Command(index) => write!(f, "command {}", index),
        }
    }
}

/// Terminal outcome of a gated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded {
        /// Number of steps dispatched.
        steps: usize,
    },
    Failed {
        reason: FailureReason,
        last_step: StepId,
        /// Human-readable cause. Never contains credential or plaintext bytes.
        detail: String,
    },
}

/// Result of one gated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub operation: OperationKind,
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Every state entered, in order.
    pub trace: Vec<GateState>,
}

impl OperationResult {
    /// Returns true if every step of the plan succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    /// The failure reason, if the run failed.
    pub fn failure(&self) -> Option<FailureReason> {
        match &self.outcome {
            Outcome::Failed { reason, .. } => Some(*reason),
            Outcome::Succeeded { .. } => None,
        }
    }
}

/// Records state transitions for one run.
struct Trace {
    states: Vec<GateState>,
}

impl Trace {
    fn new() -> Self {
        Self {
            states: vec![GateState::Idle],
        }
    }

    fn enter(&mut self, state: GateState) {
        info!(state = %state, "Gate state");
        self.states.push(state);
    }

    fn fail(&mut self, reason: FailureReason, last_step: StepId, detail: String) -> Outcome {
        warn!(reason = %reason, last_step = %last_step, "Gated run failed");
        self.states.push(GateState::Failed);
        Outcome::Failed {
            reason,
            last_step,
            detail,
        }
    }
}

/// A credential-gated operation bound to a channel.
pub struct GatedOperation<'a, T: Transport> {
    channel: &'a Channel<T>,
    kind: OperationKind,
    payload: GatedPayload,
}

impl<'a, T: Transport> GatedOperation<'a, T> {
    /// Creates the operation with its bundled payload.
    pub fn new(channel: &'a Channel<T>, kind: OperationKind) -> Self {
        Self {
            channel,
            kind,
            payload: kind.bundled_payload(),
        }
    }

    /// Replaces the payload with an operator-supplied one.
    pub fn with_payload(mut self, payload: GatedPayload) -> Self {
        self.payload = payload;
        self
    }

    /// The operation this runs.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The payload this runs.
    pub fn payload(&self) -> &GatedPayload {
        &self.payload
    }

    /// Runs the operation against the leased device.
    ///
    /// `secret` is the operator's hex-encoded key. No channel command is
    /// issued unless the key is well formed, the payload authenticates
    /// under it, and its plaintext parses as a command plan.
    pub fn run(self, lease: &DeviceLease, secret: Option<&str>) -> OperationResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("gated_run", run_id = %run_id, operation = %self.kind);
        let _enter = span.enter();

        info!(
            device = %lease.device().serial,
            payload = %self.payload.fingerprint(),
            "Starting gated run"
        );

        let mut trace = Trace::new();
        let outcome = self.drive(&mut trace, lease, secret);
        if let Outcome::Succeeded { steps } = outcome {
            info!(steps, "Gated run succeeded");
        }

        OperationResult {
            operation: self.kind,
            run_id,
            outcome,
            trace: trace.states,
        }
    }

    fn drive(&self, trace: &mut Trace, lease: &DeviceLease, secret: Option<&str>) -> Outcome {
        let Some(secret) = secret else {
            let err = GateError::MissingCredential;
            return trace.fail((&err).into(), StepId::Credential, err.to_string());
        };
        trace.enter(GateState::CredentialSupplied);

        let credential = match Credential::from_hex(secret) {
            Ok(credential) => credential,
            Err(err) => return trace.fail((&err).into(), StepId::Credential, err.to_string()),
        };
        trace.enter(GateState::Decrypting);

        let plaintext = match self.payload.open(&credential, &self.kind.context()) {
            Ok(plaintext) => plaintext,
            Err(err) => return trace.fail((&err).into(), StepId::Payload, err.to_string()),
        };
        drop(credential);
        trace.enter(GateState::Decrypted);

        let plan = match CommandPlan::from_json(&plaintext) {
            Ok(plan) => plan,
            Err(err) => {
                return trace.fail(FailureReason::PlanInvalid, StepId::Plan, err.to_string())
            }
        };
        drop(plaintext);

        // Every step must reach the leased device and nothing else.
        let target = lease.device().channel;
        if target != self.kind.target_channel() {
            let detail = format!(
                "{} targets a {} device, leased device is on the {} channel",
                self.kind,
                self.kind.target_channel(),
                target
            );
            return trace.fail(FailureReason::PlanInvalid, StepId::Plan, detail);
        }
        if let Some(index) = plan.steps().iter().position(|step| step.channel() != target) {
            let detail = format!(
                "step {} runs on the {} channel, leased device is on the {} channel",
                index,
                plan.steps()[index].channel(),
                target
            );
            return trace.fail(FailureReason::PlanInvalid, StepId::Command(index), detail);
        }
        trace.enter(GateState::Executing);

        let serial = match target {
            ChannelKind::Shell => Some(lease.device().serial.as_str()),
            ChannelKind::Bootloader => None,
        };
        for (index, step) in plan.steps().iter().enumerate() {
            debug!(index, channel = %target, "Dispatching step");
            if let Err(err) = self.channel.execute(target, serial, &step.args()) {
                return trace.fail(
                    FailureReason::StepFailed { index },
                    StepId::Command(index),
                    err.to_string(),
                );
            }
        }

        trace.enter(GateState::Succeeded);
        Outcome::Succeeded { steps: plan.len() }
    }
}

/// Seals `plan` for `kind` under `credential`.
pub fn seal_plan(
    credential: &Credential,
    kind: OperationKind,
    plan: &CommandPlan,
) -> Result<GatedPayload> {
    let json = plan.to_json()?;
    Ok(GatedPayload::seal(credential, &kind.context(), &json)?)
}

// src/pipeline/alert_policy.rs
//
// Decides whether a classified face is persisted and whether it alerts.
//
//   image / video, any label  -> log, alert = is_violation
//   live, compliant           -> log, no alert
//   live, violation           -> log + alert when the identity's cooldown
//                                has elapsed, otherwise suppressed
//
// Suppressed detections are still reported to the caller with
// `alert = false`; they are just never written to the event sink.

use crate::analysis::CooldownGate;
use crate::types::{Label, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Log { alert: bool },
    Suppress,
}

impl Decision {
    pub fn alert(&self) -> bool {
        matches!(self, Decision::Log { alert: true })
    }

    pub fn should_log(&self) -> bool {
        matches!(self, Decision::Log { .. })
    }
}

pub struct AlertPolicy;

impl AlertPolicy {
    /// `gate` carries the session's cooldown state and the identity of the
    /// face. Without it a live detection is treated like a one-shot one.
    pub fn decide(
        source: Source,
        label: Label,
        gate: Option<(&mut CooldownGate, &str)>,
    ) -> Decision {
        let violation = label.is_violation();
        match (source, gate) {
            (Source::Live, Some((gate, identity))) if violation => {
                if gate.should_alert(identity) {
                    Decision::Log { alert: true }
                } else {
                    Decision::Suppress
                }
            }
            (Source::Live, _) if !violation => Decision::Log { alert: false },
            _ => Decision::Log { alert: violation },
        }
    }
}

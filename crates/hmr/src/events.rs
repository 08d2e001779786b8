//! Structured lifecycle events.
//!
//! Everything the orchestrator logs is also available as an [`HmrEvent`] on
//! an optional channel, for embedders that drive a UI or forward the events
//! somewhere else (they serialize as tagged JSON).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{FailureKind, HmrError};
use crate::token::CacheToken;

/// Events in the reload lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HmrEvent {
    /// A load succeeded and the callback is about to run
    Loaded { token: CacheToken, initial: bool },

    /// A reload is starting
    Restarted { token: CacheToken },

    /// The change listener is registered
    WatchRegistered { target: String },

    /// A contained failure
    Failed {
        kind: FailureKind,
        code: String,
        message: String,
    },

    /// The change source closed; no more reloads
    WatchEnded,
}

impl HmrEvent {
    pub fn failed(error: &HmrError) -> Self {
        HmrEvent::Failed {
            kind: error.kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Sender half handed to [`Hmr::events`](crate::Hmr::events).
pub type EventSender = mpsc::UnboundedSender<HmrEvent>;

/// Receiver half for [`HmrEvent`]s.
pub type EventReceiver = mpsc::UnboundedReceiver<HmrEvent>;

/// Create an event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;

    #[test]
    fn test_events_serialize_tagged() {
        let json = serde_json::to_value(HmrEvent::Loaded {
            token: CacheToken::new(2),
            initial: false,
        })
        .unwrap();
        assert_eq!(json["type"], "Loaded");
        assert_eq!(json["token"], 2);

        let json = serde_json::to_value(HmrEvent::WatchEnded).unwrap();
        assert_eq!(json["type"], "WatchEnded");
    }

    #[test]
    fn test_failed_event_carries_code() {
        let event = HmrEvent::failed(&ResolveError::MissingCallerLocation.into());
        match event {
            HmrEvent::Failed { kind, code, .. } => {
                assert_eq!(kind, FailureKind::MissingCallerLocation);
                assert_eq!(code, "MISSING_CALLER_LOCATION");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

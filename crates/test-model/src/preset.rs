use serde::{Deserialize, Serialize};
use tutor_relay_model::ErrorKind;

/// A failure the scripted provider can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    Overloaded,
    Transport,
    InvalidResponse,
}

impl From<PresetFailure> for ErrorKind {
    fn from(value: PresetFailure) -> Self {
        match value {
            PresetFailure::Overloaded => ErrorKind::Overloaded,
            PresetFailure::Transport => ErrorKind::Transport,
            PresetFailure::InvalidResponse => ErrorKind::InvalidResponse,
        }
    }
}

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "content")]
    Content(String),
    #[serde(rename = "thread_id")]
    ThreadId(String),
    /// Ends the response with an error.
    #[serde(rename = "fail")]
    Fail(PresetFailure),
    /// Never produces another event.
    #[serde(rename = "stall")]
    Stall,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response. A `done` event is appended automatically
    /// unless the events end with a failure or a stall.
    pub events: Vec<PresetEvent>,
    /// If set, the request itself fails before any event is produced.
    pub rejection: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
        }
    }

    /// Creates a response with the given text chunks.
    #[inline]
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            chunks
                .into_iter()
                .map(|c| PresetEvent::Content(c.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a response that fails when the request is sent.
    #[inline]
    pub fn rejected(failure: PresetFailure) -> Self {
        Self {
            events: vec![],
            rejection: Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::ThreadId("thread-1".to_string()),
            PresetEvent::Content("Partial ".to_string()),
            PresetEvent::Fail(PresetFailure::Overloaded),
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        assert!(serialized.contains(r#"{"type":"fail","data":"overloaded"}"#));
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }
}

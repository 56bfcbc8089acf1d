//! The Anthropic Messages API, streamed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use tutor_relay_model::{
    ChatEvent, ChatMessage, ChatProvider, ChatRequest, ErrorKind, Role,
};

use crate::classify::{ErrorBody, ErrorDetail};
use crate::config::AnthropicConfig;
use crate::io::{Chunks, Sse};
use crate::response::{Decoder, SseResponse};
use crate::{Error, expect_event_stream};

const API_VERSION: &str = "2023-06-01";

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct MessageStart {
    id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: ErrorDetail,
    },
    #[serde(other)]
    Other,
}

// -----------
// Conversions
// -----------

/// Builds the request body. System messages in the history are lifted
/// out of the message list, and the first of them wins over the
/// configured prompt.
fn create_request<'a>(
    req: &'a ChatRequest,
    config: &'a AnthropicConfig,
) -> MessagesRequest<'a> {
    let system = req
        .messages
        .iter()
        .find(|msg| msg.role == Role::System && !msg.content.is_empty())
        .map(|msg| msg.content.as_str())
        .unwrap_or(req.system_prompt.as_str());
    MessagesRequest {
        model: &config.model,
        system: (!system.is_empty()).then_some(system),
        messages: req.messages.iter().filter_map(create_message).collect(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ChatMessage) -> Option<Message<'_>> {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => return None,
    };
    Some(Message {
        role,
        content: &msg.content,
    })
}

fn fallback_thread_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("claude-session-{millis}")
}

#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    saw_thread_id: bool,
}

impl Decoder for AnthropicDecoder {
    fn decode(
        &mut self,
        data: &str,
        out: &mut VecDeque<ChatEvent>,
    ) -> Result<(), Error> {
        let event = match serde_json::from_str::<StreamEvent>(data) {
            Ok(event) => event,
            Err(err) => {
                warn!("skipping malformed stream event ({err}): {data}");
                return Ok(());
            }
        };

        match event {
            StreamEvent::MessageStart { message } => {
                self.saw_thread_id = true;
                out.push_back(ChatEvent::ThreadId(message.id));
            }
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            } if !text.is_empty() => {
                out.push_back(ChatEvent::Content(text));
            }
            StreamEvent::MessageStop => {
                if !self.saw_thread_id {
                    self.saw_thread_id = true;
                    out.push_back(ChatEvent::ThreadId(fallback_thread_id()));
                }
                out.push_back(ChatEvent::Done);
            }
            StreamEvent::Error { error } => {
                return Err(ErrorBody::Nested { error }.into_error(None));
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut VecDeque<ChatEvent>) -> Result<(), Error> {
        Err(Error::new(
            "stream ended before message_stop",
            ErrorKind::Transport,
        ))
    }
}

/// A provider that streams directly from the Anthropic Messages API.
#[derive(Clone, Debug)]
pub struct AnthropicProvider {
    client: Client,
    config: Arc<AnthropicConfig>,
}

impl AnthropicProvider {
    /// Creates a new `AnthropicProvider` with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(Error::transport)?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

impl ChatProvider for AnthropicProvider {
    type Error = Error;
    type Response = SseResponse<AnthropicDecoder>;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = create_request(req, &self.config);
        let mut builder = self
            .client
            .post(format!("{}{}", self.config.base_url, "/messages"))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header(header::ACCEPT, "text/event-stream")
            .json(&body);
        if let Some(timeout) = self.config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let resp_fut = builder.send();

        async move {
            let resp = resp_fut.await.map_err(Error::transport)?;
            let resp = expect_event_stream(resp).await?;
            let sse = Sse::new(Chunks::from_response(resp));
            Ok(SseResponse::new(sse, AnthropicDecoder::default()))
        }
        .instrument(trace_span!("anthropic request"))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use tutor_relay_model::{ChatProviderError, ChatResponse};

    use super::*;
    use crate::AnthropicConfigBuilder;

    async fn collect(
        chunks: Chunks,
    ) -> (Vec<ChatEvent>, Result<(), ErrorKind>) {
        let decoder = AnthropicDecoder::default();
        let mut resp = pin!(SseResponse::new(Sse::new(chunks), decoder));
        let mut events = vec![];
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return (events, Ok(())),
                Err(err) => return (events, Err(err.kind())),
            }
        }
    }

    #[test]
    fn test_create_request() {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("You are Mrs. Parton."),
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Good day."),
                ChatMessage::user("What is a veto?"),
            ],
            system_prompt: "You are Mr. Whitaker.".to_owned(),
            thread_id: None,
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .with_max_tokens(512)
            .build();
        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "system": "You are Mrs. Parton.",
                "messages": [
                    { "role": "user", "content": "Hello" },
                    { "role": "assistant", "content": "Good day." },
                    { "role": "user", "content": "What is a veto?" },
                ],
                "max_tokens": 512,
                "temperature": 0.7,
                "stream": true,
            })
        );
    }

    #[test]
    fn test_configured_prompt_without_system_message() {
        let request = ChatRequest {
            messages: vec![ChatMessage::user("Hello")],
            system_prompt: "You are Mr. Whitaker.".to_owned(),
            thread_id: None,
        };
        let config = AnthropicConfigBuilder::with_api_key("xxx").build();
        let body = create_request(&request, &config);
        assert_eq!(body.system, Some("You are Mr. Whitaker."));
        assert_eq!(body.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_simple_events() {
        let chunks = Chunks::from_static(&[
            b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_01\",\"role\":\"assistant\"}}\n\n",
            b"event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            b"event: ping\ndata: {\"type\":\"ping\"}\n\n",
            b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
            b"event: content_block_stop\ndata: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            b"event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert_eq!(result, Ok(()));
        assert_eq!(
            events,
            vec![
                ChatEvent::ThreadId("msg_01".to_owned()),
                ChatEvent::Content("Hi".to_owned()),
                ChatEvent::Content(" there".to_owned()),
                ChatEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_fallback_thread_id() {
        let chunks = Chunks::from_static(&[
            b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"ok\"}}\n\n",
            b"data: {\"type\":\"message_stop\"}\n\n",
        ]);
        let (events, _) = collect(chunks).await;
        let ChatEvent::ThreadId(thread_id) = &events[1] else {
            panic!("unexpected event: {:?}", events[1]);
        };
        assert!(thread_id.starts_with("claude-session-"));
    }

    #[tokio::test]
    async fn test_overloaded_event() {
        let chunks = Chunks::from_static(&[
            b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert!(events.is_empty());
        assert_eq!(result, Err(ErrorKind::Overloaded));
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let chunks = Chunks::from_static(&[
            b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"cut\"}}\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert_eq!(events, vec![ChatEvent::Content("cut".to_owned())]);
        assert_eq!(result, Err(ErrorKind::Transport));
    }
}

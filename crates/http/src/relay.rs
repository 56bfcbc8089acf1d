//! The course relay endpoint.
//!
//! The relay accepts `{messages, systemPrompt, stream: true}` and answers
//! with `data:` payloads carrying either `content`, `threadId` or
//! `error`, terminated by `data: [DONE]`.

use std::collections::VecDeque;
use std::sync::Arc;

use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use tutor_relay_model::{ChatEvent, ChatMessage, ChatProvider, ChatRequest};

use crate::classify::ErrorBody;
use crate::config::RelayConfig;
use crate::io::{Chunks, Sse};
use crate::response::{Decoder, SseResponse};
use crate::{Error, expect_event_stream};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    messages: &'a [ChatMessage],
    system_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload {
    content: Option<String>,
    thread_id: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default)]
pub struct RelayDecoder;

impl Decoder for RelayDecoder {
    fn decode(
        &mut self,
        data: &str,
        out: &mut VecDeque<ChatEvent>,
    ) -> Result<(), Error> {
        if data.trim() == "[DONE]" {
            out.push_back(ChatEvent::Done);
            return Ok(());
        }

        let payload = match serde_json::from_str::<RelayPayload>(data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("skipping malformed relay payload ({err}): {data}");
                return Ok(());
            }
        };

        if let Some(error) = payload.error {
            let body = ErrorBody::Flat {
                error,
                message: payload.message,
                details: None,
            };
            return Err(body.into_error(None));
        }
        if let Some(thread_id) = payload.thread_id {
            out.push_back(ChatEvent::ThreadId(thread_id));
        }
        match payload.content {
            Some(content) if !content.is_empty() => {
                out.push_back(ChatEvent::Content(content));
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut VecDeque<ChatEvent>) -> Result<(), Error> {
        debug!("relay stream closed without [DONE]");
        out.push_back(ChatEvent::Done);
        Ok(())
    }
}

/// A provider that talks to the course relay endpoint.
#[derive(Clone, Debug)]
pub struct RelayProvider {
    client: Client,
    config: Arc<RelayConfig>,
}

impl RelayProvider {
    /// Creates a new `RelayProvider` with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, Error> {
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

impl ChatProvider for RelayProvider {
    type Error = Error;
    type Response = SseResponse<RelayDecoder>;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = RelayRequest {
            messages: &req.messages,
            system_prompt: &req.system_prompt,
            thread_id: req.thread_id.as_deref(),
            stream: true,
        };
        let mut builder = self
            .client
            .post(&self.config.endpoint)
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
            Ok(SseResponse::new(sse, RelayDecoder))
        }
        .instrument(trace_span!("relay request"))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use tutor_relay_model::{ChatProviderError, ChatResponse, ErrorKind};

    use super::*;

    async fn collect(
        chunks: Chunks,
    ) -> (Vec<ChatEvent>, Result<(), ErrorKind>) {
        let mut resp = pin!(SseResponse::new(Sse::new(chunks), RelayDecoder));
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
    fn test_request_body() {
        let messages = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there"),
        ];
        let body = RelayRequest {
            messages: &messages,
            system_prompt: "You are Reginald.",
            thread_id: None,
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "messages": [
                    { "role": "user", "content": "Hello" },
                    { "role": "assistant", "content": "Hi there" },
                ],
                "systemPrompt": "You are Reginald.",
                "stream": true,
            })
        );
    }

    #[tokio::test]
    async fn test_simple_events() {
        let chunks = Chunks::from_static(&[
            b"data: {\"threadId\":\"thread-1\"}\n\n",
            b"data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n\n",
            b"data: [DONE]\n\n",
            b"data: {\"content\":\"ignored\"}\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert_eq!(result, Ok(()));
        assert_eq!(
            events,
            vec![
                ChatEvent::ThreadId("thread-1".to_owned()),
                ChatEvent::Content("Hi".to_owned()),
                ChatEvent::Content(" there".to_owned()),
                ChatEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let chunks = Chunks::from_static(&[
            b"data: {\"content\":\"a\"}\n\n",
            b"data: {not json\n\n",
            b"data: {\"content\":\"b\"}\n\n",
            b"data: [DONE]\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert_eq!(result, Ok(()));
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], ChatEvent::Content("b".to_owned()));
    }

    #[tokio::test]
    async fn test_overload_mid_stream() {
        let chunks = Chunks::from_static(&[
            b"data: {\"content\":\"Partial \"}\n\n",
            b"data: {\"error\":\"service_overloaded\",\"message\":\"busy\"}\n\n",
            b"data: {\"content\":\"never\"}\n\n",
        ]);
        let (events, result) = collect(chunks).await;
        assert_eq!(events, vec![ChatEvent::Content("Partial ".to_owned())]);
        assert_eq!(result, Err(ErrorKind::Overloaded));
    }

    #[tokio::test]
    async fn test_read_error_message() {
        let chunks = Chunks::from_static_then_error(
            &[b"data: {\"content\":\"Partial \"}\n\n"],
            "connection reset",
        );
        let mut resp = pin!(SseResponse::new(Sse::new(chunks), RelayDecoder));
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap();
        assert_eq!(event, Some(ChatEvent::Content("Partial ".to_owned())));

        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.message(),
            "failed to read the stream: connection reset"
        );
    }

    #[tokio::test]
    async fn test_unterminated_stream_completes() {
        let chunks = Chunks::from_static(&[b"data: {\"content\":\"ok\"}\n\n"]);
        let (events, result) = collect(chunks).await;
        assert_eq!(result, Ok(()));
        assert_eq!(
            events,
            vec![ChatEvent::Content("ok".to_owned()), ChatEvent::Done]
        );
    }
}

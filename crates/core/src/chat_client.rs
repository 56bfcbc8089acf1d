use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tracing::Instrument;
use tutor_relay_model::{
    ChatEvent, ChatProvider, ChatProviderError, ChatRequest, ChatResponse,
};

use crate::error::Error;

type BoxedError = Box<dyn ChatProviderError>;
type SendRequestResult = Result<ChatClientResponse, Error>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ChatRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A wrapper around a chat provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ChatClient {
    handler_fn: HandlerFn,
}

impl ChatClient {
    #[inline]
    pub fn new<P: ChatProvider + 'static>(provider: P) -> Self {
        // Erase `P` so that sessions don't carry a generic parameter.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("sending {} messages", req.messages.len());
                    match fut.await {
                        Ok(resp) => Ok(ChatClientResponse {
                            inner: Box::pin(resp),
                        }),
                        Err(err) => {
                            debug!("request failed: {err}");
                            Err(Error::from_provider(&err))
                        }
                    }
                }
                .instrument(trace_span!("chat client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the streamed response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Dropping the future drops the
    /// underlying request.
    #[inline]
    pub async fn send_request(
        &self,
        req: ChatRequest,
    ) -> Result<ChatClientResponse, Error> {
        (self.handler_fn)(req).await
    }
}

trait ErasedResponse: Send {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, BoxedError>>;
}

impl<R: ChatResponse> ErasedResponse for R {
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, BoxedError>> {
        ChatResponse::poll_next_event(self, cx)
            .map_err(|err| Box::new(err) as BoxedError)
    }
}

/// A response stream with the provider type erased.
pub struct ChatClientResponse {
    inner: Pin<Box<dyn ErasedResponse>>,
}

impl ChatClientResponse {
    /// Waits for the next event, returning `None` once the response
    /// has completed.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. No event is lost if the future is
    /// dropped before it resolves.
    pub async fn next_event(&mut self) -> Result<Option<ChatEvent>, Error> {
        let event = poll_fn(|cx| self.inner.as_mut().poll_next_event(cx))
            .await
            .map_err(|err| Error::from_provider(&*err))?;
        if let Some(event) = &event {
            trace!("got an event: {event:?}");
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use tutor_relay_model::ChatMessage;
    use tutor_relay_test_model::{
        PresetFailure, PresetResponse, TestChatProvider,
    };

    use super::*;
    use crate::ErrorKind;

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("Hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestChatProvider::default();
        for _ in 0..3 {
            provider.add_response(PresetResponse::with_chunks([
                "How ", "are ", "you?",
            ]));
        }
        let client = ChatClient::new(provider);

        for _ in 0..3 {
            let mut resp = client.send_request(request()).await.unwrap();
            let mut transcript = String::new();
            while let Some(event) = resp.next_event().await.unwrap() {
                match event {
                    ChatEvent::Content(text) => transcript.push_str(&text),
                    ChatEvent::ThreadId(_) => {}
                    ChatEvent::Done => break,
                }
            }
            assert_eq!(transcript, "How are you?");
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let mut provider = TestChatProvider::default();
        provider.add_response(PresetResponse::rejected(
            PresetFailure::InvalidResponse,
        ));
        let client = ChatClient::new(provider);

        let err = client.send_request(request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::StreamParse);

        let err = client.send_request(request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}

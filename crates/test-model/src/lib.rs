//! A local scripted chat provider for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use tutor_relay_model::{
    ChatEvent, ChatProvider, ChatProviderError, ChatRequest, ChatResponse,
    ErrorKind,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ChatProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestChatResponse {
    events: VecDeque<PresetEvent>,
    delay: Duration,
    finished: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ChatResponse for TestChatResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }
        if matches!(this.events.front(), Some(PresetEvent::Stall)) {
            return Poll::Pending;
        }

        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let event = match this.events.pop_front() {
            Some(PresetEvent::Content(text)) => ChatEvent::Content(text),
            Some(PresetEvent::ThreadId(id)) => ChatEvent::ThreadId(id),
            Some(PresetEvent::Fail(failure)) => {
                this.finished = true;
                return Poll::Ready(Err(Error {
                    message: "scripted failure",
                    kind: failure.into(),
                }));
            }
            Some(PresetEvent::Stall) => unreachable!("checked above"),
            None => {
                this.finished = true;
                ChatEvent::Done
            }
        };
        Poll::Ready(Ok(Some(event)))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ChatRequest>,
}

/// A local scripted chat provider for testing purpose.
///
/// Each request consumes the next preset response in the script. If the
/// script runs out, the request fails with a transport error. Clones
/// share the same script, so a test can keep one to inspect the requests
/// after handing the provider over.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestChatProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestChatProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    /// Sets the delay before each event, 1ms by default.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script().requests.clone()
    }

    #[inline]
    pub fn remaining_responses(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for TestChatProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestChatProvider")
            .field("remaining_responses", &self.remaining_responses())
            .finish_non_exhaustive()
    }
}

impl ChatProvider for TestChatProvider {
    type Error = crate::Error;
    type Response = TestChatResponse;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let result = match script.responses.pop_front() {
            None => Err(Error {
                message: "script exhausted",
                kind: ErrorKind::Transport,
            }),
            Some(PresetResponse {
                rejection: Some(failure),
                ..
            }) => Err(Error {
                message: "scripted rejection",
                kind: failure.into(),
            }),
            Some(PresetResponse { events, .. }) => Ok(TestChatResponse {
                events: events.into(),
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                finished: false,
                sleep: None,
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use tutor_relay_model::ChatMessage;

    use super::*;

    async fn collect_response(
        resp: TestChatResponse,
    ) -> (String, Result<(), ErrorKind>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(ChatEvent::Content(delta))) => msg.push_str(&delta),
                Ok(Some(_)) => {}
                Ok(None) => return (msg, Ok(())),
                Err(err) => return (msg, Err(err.kind())),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestChatProvider::default();
        provider.add_response(PresetResponse::with_chunks(["Hello, ", "world!"]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::Content("Sure, ".to_owned()),
            PresetEvent::Fail(PresetFailure::Overloaded),
        ]));
        provider.add_response(PresetResponse::rejected(PresetFailure::Overloaded));

        let req = ChatRequest {
            messages: vec![ChatMessage::user("Hi")],
            ..Default::default()
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert_eq!(result, Ok(()));

        let resp = provider.send_request(&req).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Sure, ");
        assert_eq!(result, Err(ErrorKind::Overloaded));

        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Overloaded);

        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Transport);

        assert_eq!(provider.requests().len(), 4);
        assert_eq!(provider.remaining_responses(), 0);
    }
}

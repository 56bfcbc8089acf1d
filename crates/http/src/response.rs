use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tutor_relay_model::{ChatEvent, ChatResponse, ErrorKind};

use crate::Error;
use crate::io::Sse;

/// Translates the `data` payloads of one wire format into chat events.
pub trait Decoder: Send + 'static {
    /// Decodes one payload, pushing the resulting events to `out`.
    ///
    /// Payloads that cannot be understood should be logged and skipped.
    /// Returning an error ends the response.
    fn decode(
        &mut self,
        data: &str,
        out: &mut VecDeque<ChatEvent>,
    ) -> Result<(), Error>;

    /// Called once when the stream ends before a [`ChatEvent::Done`] was
    /// decoded.
    fn finish(&mut self, out: &mut VecDeque<ChatEvent>) -> Result<(), Error>;
}

struct PartialState<D> {
    sse: Sse,
    decoder: D,
    pending: VecDeque<ChatEvent>,
    eof: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent<D> = Result<(Option<ChatEvent>, PartialState<D>), Error>;

pin_project! {
    /// A chat response read from a server-sent event stream.
    pub struct SseResponse<D> {
        next_event_fut: Option<PinnedFuture<NextEvent<D>>>,
    }
}

impl<D: Decoder> SseResponse<D> {
    #[inline]
    pub(crate) fn new(sse: Sse, decoder: D) -> Self {
        let partial_state = PartialState {
            sse,
            decoder,
            pending: VecDeque::new(),
            eof: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl<D: Decoder> ChatResponse for SseResponse<D> {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // Nothing is read after the terminal event, even if the server
        // keeps sending.
        if event == ChatEvent::Done {
            *this.next_event_fut = None;
        } else {
            let next_event_fut =
                async move { next_event(partial_state).await };
            *this.next_event_fut = Some(Box::pin(next_event_fut));
        }

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event<D: Decoder>(
    mut partial_state: PartialState<D>,
) -> NextEvent<D> {
    loop {
        if let Some(event) = partial_state.pending.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.eof {
            return Ok((None, partial_state));
        }

        let PartialState {
            sse,
            decoder,
            pending,
            eof,
        } = &mut partial_state;
        match sse.next_event().await {
            Ok(Some(data)) => {
                trace!("got sse event: {data}");
                decoder.decode(&data, pending)?;
            }
            Ok(None) => {
                *eof = true;
                decoder.finish(pending)?;
            }
            Err(err) => {
                return Err(Error::new(err.to_string(), ErrorKind::Transport));
            }
        }
    }
}

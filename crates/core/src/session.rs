mod builder;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use tutor_relay_model::{ChatMessage, ChatRequest};

use crate::abort::AbortSignal;
use crate::chat_client::ChatClient;
use crate::conversation::Conversation;
use crate::cue::is_wrap_up;
use crate::error::{Error, ErrorKind};
use crate::retry::{Failure, RelayEvent, RetryPolicy};
use crate::topic::{Topic, TopicTracker};

pub use builder::SessionBuilder;

/// What to do with the received text when a reply fails midway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PartialPolicy {
    /// Throw the partial reply away.
    #[default]
    Discard,
    /// Keep the partial reply as an assistant message.
    ///
    /// Aborted sends are discarded regardless.
    Commit,
}

/// A completed exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The committed assistant message.
    pub message: ChatMessage,
    /// The ids of the topics completed by the learner's message.
    pub newly_completed: Vec<String>,
    /// The number of requests made, including the first one.
    pub attempts: u32,
}

/// A serializable copy of a session's state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// The thread id last reported by the provider.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// The committed messages.
    pub messages: Vec<ChatMessage>,
    /// The rubric topics and their completion.
    #[serde(default)]
    pub topics: Vec<Topic>,
    /// Whether the bot has signalled the end of the lesson.
    #[serde(default)]
    pub wrapped_up: bool,
}

/// A tutoring conversation between a learner and the bot.
///
/// A session owns its message log, so only one send can be in flight
/// at a time. Dropping a send future before it resolves discards the
/// reply that was streaming.
pub struct Session {
    client: ChatClient,
    system_prompt: String,
    retry_policy: RetryPolicy,
    partial_policy: PartialPolicy,
    conversation: Conversation,
    tracker: TopicTracker,
    thread_id: Option<String>,
    wrapped_up: bool,
}

impl Session {
    fn from_builder(builder: SessionBuilder) -> Self {
        let mut tracker = TopicTracker::new(builder.topics);
        let conversation = Conversation::with_messages(builder.messages);
        tracker.evaluate(conversation.user_texts());
        Self {
            client: builder.client,
            system_prompt: builder.system_prompt,
            retry_policy: builder.retry_policy,
            partial_policy: builder.partial_policy,
            conversation,
            tracker,
            thread_id: builder.thread_id,
            wrapped_up: builder.wrapped_up,
        }
    }

    /// Sends a learner message and streams the reply.
    ///
    /// See [`send_with_abort`](Self::send_with_abort).
    #[inline]
    pub async fn send(
        &mut self,
        text: &str,
        on_event: impl FnMut(RelayEvent),
    ) -> Result<Option<Reply>, Failure> {
        self.send_with_abort(text, AbortSignal::never(), on_event)
            .await
    }

    /// Sends a learner message and streams the reply, stopping early if
    /// `abort` fires.
    ///
    /// Blank input is ignored and `Ok(None)` is returned without
    /// contacting the provider. Otherwise the message is appended, the
    /// rubric topics are re-evaluated, and every event of the reply is
    /// passed to `on_event` as it arrives. The reply is committed only
    /// once the provider finishes it.
    pub async fn send_with_abort(
        &mut self,
        text: &str,
        mut abort: AbortSignal,
        mut on_event: impl FnMut(RelayEvent),
    ) -> Result<Option<Reply>, Failure> {
        let mut guard = match StreamGuard::begin(&mut self.conversation) {
            Ok(guard) => guard,
            Err(error) => {
                return Err(Failure {
                    error,
                    partial: String::new(),
                    thread_id: self.thread_id.clone(),
                    attempts: 0,
                });
            }
        };
        if !guard.conversation.append_user_message(text) {
            trace!("ignoring blank input");
            return Ok(None);
        }
        let newly_completed =
            self.tracker.evaluate(guard.conversation.user_texts());

        let req = ChatRequest {
            messages: guard.conversation.messages().to_vec(),
            system_prompt: self.system_prompt.clone(),
            thread_id: self.thread_id.clone(),
        };

        let outcome = self
            .retry_policy
            .run(&self.client, &req, &mut abort, |event| {
                if let RelayEvent::Content(text) = &event {
                    guard.push(text);
                }
                on_event(event);
            })
            .instrument(debug_span!("send", turn = req.messages.len()))
            .await;

        match outcome {
            Ok(completion) => {
                let message = guard.commit();
                if completion.thread_id.is_some() {
                    self.thread_id = completion.thread_id;
                }
                let Some(message) = message else {
                    // The retry loop never completes with empty content.
                    return Ok(None);
                };
                self.check_wrap_up(&message);
                Ok(Some(Reply {
                    message,
                    newly_completed,
                    attempts: completion.attempts,
                }))
            }
            Err(failure) => {
                let keep = self.partial_policy == PartialPolicy::Commit
                    && failure.error.kind() != ErrorKind::Aborted;
                if keep {
                    if let Some(message) = guard.commit() {
                        debug!(
                            "kept {} bytes of a partial reply",
                            message.content.len()
                        );
                        self.check_wrap_up(&message);
                    }
                } else {
                    guard.discard();
                }
                if failure.thread_id.is_some() {
                    self.thread_id.clone_from(&failure.thread_id);
                }
                Err(failure)
            }
        }
    }

    fn check_wrap_up(&mut self, message: &ChatMessage) {
        if !self.wrapped_up && is_wrap_up(&message.content) {
            info!("the bot wrapped up the lesson");
            self.wrapped_up = true;
        }
    }

    /// Returns the committed messages.
    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    /// Returns the message log.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the rubric tracker.
    #[inline]
    pub fn tracker(&self) -> &TopicTracker {
        &self.tracker
    }

    /// Returns the rubric topics.
    #[inline]
    pub fn topics(&self) -> &[Topic] {
        self.tracker.topics()
    }

    /// Returns the thread id last reported by the provider.
    #[inline]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Returns `true` once a reply has signalled the end of the lesson.
    #[inline]
    pub fn is_wrapped_up(&self) -> bool {
        self.wrapped_up
    }

    /// Returns the system prompt.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Captures the state needed to resume this session later.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            thread_id: self.thread_id.clone(),
            messages: self.conversation.messages().to_vec(),
            topics: self.tracker.topics().to_vec(),
            wrapped_up: self.wrapped_up,
        }
    }
}

/// Keeps the assistant reply open for the duration of a send and
/// discards it if the send is dropped midway.
///
/// The user message is appended after the reply is opened. The reply
/// lives in a separate buffer, so the log order is unaffected.
struct StreamGuard<'a> {
    conversation: &'a mut Conversation,
}

impl<'a> StreamGuard<'a> {
    fn begin(conversation: &'a mut Conversation) -> Result<Self, Error> {
        conversation.begin_assistant_stream()?;
        Ok(Self { conversation })
    }

    #[inline]
    fn push(&mut self, text: &str) {
        self.conversation.append_stream_chunk(text);
    }

    fn commit(self) -> Option<ChatMessage> {
        self.conversation.commit_stream().cloned()
    }

    fn discard(self) {
        self.conversation.discard_stream();
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if self.conversation.discard_stream().is_some() {
            debug!("discarding an unfinished reply");
        }
    }
}

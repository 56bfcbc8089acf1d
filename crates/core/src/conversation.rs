//! The append-only message log of a session.

use tutor_relay_model::{ChatMessage, Role};

use crate::error::Error;

/// The ordered message log plus the reply currently being streamed.
///
/// Committed messages are never modified or reordered. At most one
/// assistant reply can be open at a time, and its text stays out of
/// [`messages`](Self::messages) until it is committed.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    streaming: Option<String>,
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation seeded with previously committed messages.
    #[inline]
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            streaming: None,
        }
    }

    /// Returns the committed messages in conversation order.
    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the text received so far for the open reply, if any.
    #[inline]
    pub fn streaming_text(&self) -> Option<&str> {
        self.streaming.as_deref()
    }

    /// Returns `true` while an assistant reply is open.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Appends a learner message.
    ///
    /// Blank input is ignored and `false` is returned.
    pub fn append_user_message(&mut self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        self.messages.push(ChatMessage::user(content));
        true
    }

    /// Opens a new assistant reply with an empty buffer.
    pub fn begin_assistant_stream(&mut self) -> Result<(), Error> {
        if self.streaming.is_some() {
            return Err(Error::concurrency_violation());
        }
        self.streaming = Some(String::new());
        Ok(())
    }

    /// Appends text to the open reply. Does nothing if no reply is open.
    pub fn append_stream_chunk(&mut self, text: &str) {
        match &mut self.streaming {
            Some(buffer) => buffer.push_str(text),
            None => trace!("dropping chunk, no reply is streaming"),
        }
    }

    /// Closes the open reply and appends it to the log.
    ///
    /// An empty reply is closed without being appended, in which case
    /// `None` is returned.
    pub fn commit_stream(&mut self) -> Option<&ChatMessage> {
        let buffer = self.streaming.take()?;
        if buffer.is_empty() {
            return None;
        }
        self.messages.push(ChatMessage::assistant(buffer));
        self.messages.last()
    }

    /// Closes the open reply without appending it, returning the text
    /// that was thrown away.
    #[inline]
    pub fn discard_stream(&mut self) -> Option<String> {
        self.streaming.take()
    }

    /// Iterates over the text of all learner messages.
    pub fn user_texts(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|msg| msg.role == Role::User)
            .map(|msg| msg.content.as_str())
    }
}

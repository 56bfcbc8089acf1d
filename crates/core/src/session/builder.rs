use tutor_relay_model::{ChatMessage, ChatProvider};

use super::{PartialPolicy, Session, SessionSnapshot};
use crate::chat_client::ChatClient;
use crate::retry::RetryPolicy;
use crate::topic::Topic;

/// [`Session`] builder.
pub struct SessionBuilder {
    pub(crate) client: ChatClient,
    pub(crate) system_prompt: String,
    pub(crate) topics: Vec<Topic>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) partial_policy: PartialPolicy,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) thread_id: Option<String>,
    pub(crate) wrapped_up: bool,
}

impl SessionBuilder {
    /// Creates a new builder with the specified chat provider.
    #[inline]
    pub fn with_provider<P: ChatProvider + 'static>(provider: P) -> Self {
        Self {
            client: ChatClient::new(provider),
            system_prompt: String::new(),
            topics: vec![],
            retry_policy: RetryPolicy::default(),
            partial_policy: PartialPolicy::default(),
            messages: vec![],
            thread_id: None,
            wrapped_up: false,
        }
    }

    /// Sets the system prompt for the bot persona.
    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the rubric topics to track.
    #[inline]
    pub fn with_topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.topics = topics.into_iter().collect();
        self
    }

    /// Sets the retry policy.
    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets what happens to a reply that fails midway.
    #[inline]
    pub fn with_partial_policy(mut self, policy: PartialPolicy) -> Self {
        self.partial_policy = policy;
        self
    }

    /// Restores a previous session from its snapshot.
    ///
    /// Topics from the snapshot replace any set earlier.
    pub fn resume(mut self, snapshot: SessionSnapshot) -> Self {
        self.messages = snapshot.messages;
        self.topics = snapshot.topics;
        self.thread_id = snapshot.thread_id;
        self.wrapped_up = snapshot.wrapped_up;
        self
    }

    /// Builds the session.
    #[inline]
    pub fn build(self) -> Session {
        Session::from_builder(self)
    }
}

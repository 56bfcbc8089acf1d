//! Retrying a streamed turn while the provider is overloaded.

use std::fmt::{self, Debug, Display};
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tokio::time::{sleep, timeout};
use tutor_relay_model::{ChatEvent, ChatRequest};

use crate::abort::AbortSignal;
use crate::chat_client::ChatClient;
use crate::error::{Error, ErrorKind};

/// Controls how a send reacts to an overloaded provider.
///
/// An attempt is retried only when the provider reports overload before
/// producing any content. Once content has been delivered, the failure
/// is final. The delay before retry `n` (counting from 0) is
/// `min(base_delay * 2^n, max_delay)`.
///
/// Each attempt is cut off after the attempt timeout, so a send always
/// ends within `(max_retries + 1) * attempt_timeout` plus the delays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    idle_timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            idle_timeout: Some(Duration::from_secs(60)),
            attempt_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    /// Sets the number of attempts made after the first one.
    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[inline]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the upper bound of the delay between attempts.
    #[inline]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets how long to wait for the provider's next event before the
    /// attempt fails, or `None` to wait forever.
    #[inline]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets how long a single attempt may take from sending the request
    /// to the end of the reply, or `None` for no limit.
    #[inline]
    pub fn with_attempt_timeout(
        mut self,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Returns the number of attempts made after the first one.
    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Starts tracking a new send.
    pub fn start(&self) -> RetryState {
        let backoff = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build();
        RetryState {
            attempt: 0,
            max_retries: self.max_retries,
            max_delay: self.max_delay,
            last_delay: None,
            backoff,
        }
    }

    /// Runs a send to completion, retrying while the provider is busy.
    ///
    /// Every event reaches `on_event` in order. Exactly one outcome is
    /// returned per call.
    pub(crate) async fn run<F>(
        &self,
        client: &ChatClient,
        req: &ChatRequest,
        abort: &mut AbortSignal,
        mut on_event: F,
    ) -> Result<Completion, Failure>
    where
        F: FnMut(RelayEvent),
    {
        let mut state = self.start();
        let mut thread_id = None;

        loop {
            let mut content = String::new();
            let result = tokio::select! {
                biased;
                _ = abort.aborted() => Err(Error::aborted()),
                result = within(
                    self.attempt_timeout,
                    self.attempt(
                        client,
                        req,
                        &mut content,
                        &mut thread_id,
                        &mut on_event,
                    ),
                    |limit| format!("provider did not finish within {limit:?}"),
                ) => result,
            };
            let attempts = state.attempt + 1;

            let error = match result {
                Ok(()) if !content.is_empty() => {
                    debug!("reply completed after {attempts} attempt(s)");
                    return Ok(Completion {
                        content,
                        thread_id,
                        attempts,
                    });
                }
                Ok(()) => Error::new(
                    ErrorKind::StreamParse,
                    "empty response from provider",
                ),
                Err(err) if err.kind() == ErrorKind::Aborted => {
                    debug!("send aborted during attempt {attempts}");
                    return Err(Failure {
                        error: err,
                        partial: content,
                        thread_id,
                        attempts,
                    });
                }
                Err(err)
                    if err.kind() == ErrorKind::Overloaded
                        && content.is_empty() =>
                {
                    match state.next_delay() {
                        Some(delay) => {
                            warn!(
                                "provider overloaded, retry {} of {} in {:?}",
                                state.attempt, self.max_retries, delay
                            );
                            on_event(RelayEvent::Retrying {
                                attempt: state.attempt,
                                delay,
                                notice: retry_notice(
                                    state.attempt,
                                    self.max_retries,
                                    delay,
                                ),
                            });
                            let aborted = tokio::select! {
                                biased;
                                _ = abort.aborted() => true,
                                _ = sleep(delay) => false,
                            };
                            if aborted {
                                debug!("send aborted while waiting");
                                return Err(Failure {
                                    error: Error::aborted(),
                                    partial: String::new(),
                                    thread_id,
                                    attempts,
                                });
                            }
                            continue;
                        }
                        None => Error::new(
                            ErrorKind::Overloaded,
                            format!(
                                "provider still overloaded after {attempts} \
                                 attempts"
                            ),
                        ),
                    }
                }
                Err(err) => err,
            };

            error!("send failed: {error}");
            on_event(RelayEvent::Failed {
                notice: format!("Error: {}", error.message()),
                error: error.clone(),
            });
            return Err(Failure {
                error,
                partial: content,
                thread_id,
                attempts,
            });
        }
    }

    async fn attempt<F>(
        &self,
        client: &ChatClient,
        req: &ChatRequest,
        content: &mut String,
        thread_id: &mut Option<String>,
        on_event: &mut F,
    ) -> Result<(), Error>
    where
        F: FnMut(RelayEvent),
    {
        let idle = |limit: Duration| format!("provider sent nothing for {limit:?}");
        let mut resp = within(
            self.idle_timeout,
            client.send_request(req.clone()),
            idle,
        )
        .await?;
        loop {
            match within(self.idle_timeout, resp.next_event(), idle).await? {
                Some(ChatEvent::Content(text)) => {
                    content.push_str(&text);
                    on_event(RelayEvent::Content(text));
                }
                Some(ChatEvent::ThreadId(id)) => {
                    *thread_id = Some(id.clone());
                    on_event(RelayEvent::ThreadId(id));
                }
                Some(ChatEvent::Done) | None => return Ok(()),
            }
        }
    }
}

async fn within<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, Error>>,
    describe: impl FnOnce(Duration) -> String,
) -> Result<T, Error> {
    let Some(limit) = limit else {
        return fut.await;
    };
    timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(Error::new(ErrorKind::Transport, describe(limit)))
    })
}

fn retry_notice(attempt: u32, max_retries: u32, delay: Duration) -> String {
    format!(
        "The tutor is busy right now. Retrying in {:.1}s \
         (attempt {attempt} of {max_retries})...",
        delay.as_secs_f64()
    )
}

/// Tracks the retries of a single send.
pub struct RetryState {
    attempt: u32,
    max_retries: u32,
    max_delay: Duration,
    last_delay: Option<Duration>,
    backoff: ExponentialBackoff,
}

impl RetryState {
    /// Returns the number of retries scheduled so far.
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay of the most recent retry.
    #[inline]
    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Schedules another retry and returns its delay, or `None` if the
    /// retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let delay = self.backoff.next_backoff().unwrap_or(self.max_delay);
        self.attempt += 1;
        self.last_delay = Some(delay);
        Some(delay)
    }
}

impl Debug for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryState")
            .field("attempt", &self.attempt)
            .field("max_retries", &self.max_retries)
            .field("last_delay", &self.last_delay)
            .finish_non_exhaustive()
    }
}

/// An event observed while a send is in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// A piece of the assistant's reply.
    Content(String),
    /// The provider reported the thread of this conversation.
    ThreadId(String),
    /// The provider is busy and the send will be retried.
    Retrying {
        /// The retry number, starting from 1.
        attempt: u32,
        /// How long the send waits before retrying.
        delay: Duration,
        /// A message suitable for showing to the learner.
        notice: String,
    },
    /// The send failed and will not be retried.
    Failed {
        /// The terminal error.
        error: Error,
        /// A message suitable for showing to the learner.
        notice: String,
    },
}

/// A successfully completed send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// The full text of the reply.
    pub content: String,
    /// The last thread id reported by the provider.
    pub thread_id: Option<String>,
    /// The number of requests made, including the first one.
    pub attempts: u32,
}

/// A send that ended without a usable reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// Why the send failed.
    pub error: Error,
    /// The content received before the failure.
    pub partial: String,
    /// The last thread id reported by the provider.
    pub thread_id: Option<String>,
    /// The number of requests made, including the first one.
    pub attempts: u32,
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

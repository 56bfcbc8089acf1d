use std::fmt::{self, Display};
use std::path::Path;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use tutor_relay_core::topic::Topic;
use tutor_relay_core::{SessionBuilder, SessionSnapshot};

/// A lesson: the bot persona and the rubric the learner works through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// The system prompt for the bot persona.
    pub system_prompt: String,
    /// A greeting shown before the learner's first message.
    #[serde(default)]
    pub opening_message: Option<String>,
    /// The rubric topics.
    #[serde(default)]
    pub topics: Vec<Topic>,
}

impl Lesson {
    /// Parses a lesson from JSON.
    pub fn from_json(json: &str) -> Result<Self, LessonError> {
        serde_json::from_str(json).map_err(LessonError::Parse)
    }

    /// Reads a lesson from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LessonError> {
        let path = path.as_ref();
        debug!("loading lesson from {}", path.display());
        let json = fs::read_to_string(path).map_err(LessonError::Io)?;
        Self::from_json(&json)
    }

    /// Applies the persona and the rubric to a session builder.
    ///
    /// When `snapshot` is given, the session resumes from it and the
    /// lesson's topics are only used if the snapshot has none.
    pub fn configure(
        &self,
        builder: SessionBuilder,
        snapshot: Option<SessionSnapshot>,
    ) -> SessionBuilder {
        let builder = builder
            .with_system_prompt(&self.system_prompt)
            .with_topics(self.topics.iter().cloned());
        match snapshot {
            Some(snapshot) if snapshot.topics.is_empty() => {
                let topics = self.topics.clone();
                builder.resume(snapshot).with_topics(topics)
            }
            Some(snapshot) => builder.resume(snapshot),
            None => builder,
        }
    }
}

/// The error type for loading a [`Lesson`].
#[derive(Debug)]
pub enum LessonError {
    /// The file could not be read.
    Io(io::Error),
    /// The file is not a valid lesson.
    Parse(serde_json::Error),
}

impl Display for LessonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LessonError::Io(err) => write!(f, "failed to read lesson: {err}"),
            LessonError::Parse(err) => write!(f, "invalid lesson: {err}"),
        }
    }
}

impl std::error::Error for LessonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LessonError::Io(err) => Some(err),
            LessonError::Parse(err) => Some(err),
        }
    }
}

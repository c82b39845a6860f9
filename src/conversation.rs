//! Transcript building.
//!
//! Turns are only ever appended. The one exception is a failed exchange: a user
//! question followed by a `system-error` turn is dropped before the next question
//! so the transcript never accumulates dead branches.

use crate::models::{Filter, Speaker, Transcript, Turn};

pub const NO_VALID_RESPONSE: &str = "No valid response was returned.";

/// What a provider reply boils down to.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAnswer {
    Content(String),
    Filtered(Filter),
    Empty,
}

impl ParsedAnswer {
    pub fn into_turn(self) -> Turn {
        match self {
            ParsedAnswer::Content(text) => Turn::model(text),
            ParsedAnswer::Filtered(filter) => Turn::system_error(filter),
            ParsedAnswer::Empty => Turn::model(NO_VALID_RESPONSE),
        }
    }
}

/// Start a new transcript from a single question.
pub fn new_transcript(question: &str) -> Transcript {
    vec![Turn::user(question)]
}

pub fn append_user_turn(transcript: &mut Transcript, question: &str) {
    drop_failed_exchange(transcript);
    transcript.push(Turn::user(question));
}

pub fn append_answer_turn(transcript: &mut Transcript, answer: ParsedAnswer) -> &Turn {
    transcript.push(answer.into_turn());
    &transcript[transcript.len() - 1]
}

/// Remove a trailing `(user, system-error)` pair. Returns true if one was removed.
pub fn drop_failed_exchange(transcript: &mut Transcript) -> bool {
    let n = transcript.len();
    if n >= 2
        && transcript[n - 1].role == Speaker::SystemError
        && transcript[n - 2].role == Speaker::User
    {
        transcript.truncate(n - 2);
        return true;
    }
    false
}

/// For a transcript that already ends with the pending question, remove a failed
/// exchange sitting right before it.
pub fn heal_pending(transcript: &mut Transcript) -> bool {
    let Some(last) = transcript.last() else {
        return false;
    };
    if last.role != Speaker::User {
        return false;
    }
    let Some(pending) = transcript.pop() else {
        return false;
    };
    let healed = drop_failed_exchange(transcript);
    if healed {
        tracing::debug!("Dropped failed exchange before pending question");
    }
    transcript.push(pending);
    healed
}

pub fn ends_with_user_turn(transcript: &[Turn]) -> bool {
    transcript
        .last()
        .is_some_and(|turn| turn.role == Speaker::User)
}

/// Text of the most recent user question, if any.
pub fn last_question(transcript: &[Turn]) -> Option<String> {
    transcript
        .iter()
        .rev()
        .find(|turn| turn.role == Speaker::User)
        .map(Turn::text)
}

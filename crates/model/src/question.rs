use crate::error::{Error, Result};
use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt::{self, Display};
use percent_encoding::percent_decode_str;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Answered with either `true` or `false`.
    Boolean,
    /// Answered with one of four presented choices.
    Multiple,
}

impl Kind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Multiple => "multiple",
        }
    }
}

impl TryFrom<&str> for Kind {
    type Error = Error;
    fn try_from(text: &str) -> Result<Self> {
        Ok(match text {
            "boolean" => Self::Boolean,
            "multiple" => Self::Multiple,
            _ => return Err(Error::UnknownKind),
        })
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Points awarded for answering a question of this difficulty correctly.
    pub const fn points(self) -> u32 {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }
}

impl TryFrom<&str> for Difficulty {
    type Error = Error;
    fn try_from(text: &str) -> Result<Self> {
        Ok(match text {
            "easy" => Self::Easy,
            "medium" => Self::Medium,
            "hard" => Self::Hard,
            _ => return Err(Error::UnknownDifficulty),
        })
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trivia question. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawQuestion")]
pub struct Question {
    /// Question to be displayed in chat.
    pub text: Box<str>,
    pub category: Box<str>,
    pub kind: Kind,
    pub difficulty: Difficulty,
    pub correct: Box<str>,
    /// Wrong answers in the order the bank served them.
    pub incorrect: Box<[Box<str>]>,
}

impl Question {
    /// Answers match case-insensitively but must otherwise be spelled exactly.
    pub fn is_correct(&self, answer: &str) -> bool {
        answer.to_lowercase() == self.correct.to_lowercase()
    }

    /// Every possible answer: the incorrect ones followed by the correct one.
    pub fn choices(&self) -> Vec<&str> {
        self.incorrect.iter().map(AsRef::as_ref).chain(core::iter::once(self.correct.as_ref())).collect()
    }
}

/// Schema of a single result from the question bank, with every string
/// percent-encoded as per RFC 3986.
#[derive(Deserialize)]
struct RawQuestion {
    category: String,
    #[serde(rename = "type")]
    kind: String,
    difficulty: String,
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

fn decode(text: &str) -> Result<Box<str>> {
    let decoded = percent_decode_str(text).decode_utf8().map_err(|_| Error::Encoding)?;
    Ok(decoded.into_owned().into_boxed_str())
}

impl TryFrom<RawQuestion> for Question {
    type Error = Error;
    fn try_from(raw: RawQuestion) -> Result<Self> {
        let kind = Kind::try_from(decode(&raw.kind)?.as_ref())?;
        let difficulty = Difficulty::try_from(decode(&raw.difficulty)?.as_ref())?;
        let incorrect = raw.incorrect_answers.iter().map(|answer| decode(answer)).collect::<Result<Box<[_]>>>()?;
        if kind == Kind::Multiple && incorrect.len() != 3 {
            return Err(Error::ChoiceCount);
        }

        Ok(Self {
            text: decode(&raw.question)?,
            category: decode(&raw.category)?,
            kind,
            difficulty,
            correct: decode(&raw.correct_answer)?,
            incorrect,
        })
    }
}

/// Response envelope from the question bank.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionSet {
    /// Zero on success. Anything else means the bank refused the request.
    pub response_code: u8,
    #[serde(default)]
    pub results: Vec<Question>,
}

impl QuestionSet {
    pub const fn is_success(&self) -> bool {
        self.response_code == 0
    }
}

use core::fmt::{self, Display};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A field was not valid percent-encoded UTF-8.
    Encoding,
    /// The question type is neither `boolean` nor `multiple`.
    UnknownKind,
    /// The difficulty is not one of `easy`, `medium`, or `hard`.
    UnknownDifficulty,
    /// A multiple-choice question did not come with exactly three wrong answers.
    ChoiceCount,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encoding => "invalid percent-encoded text",
            Self::UnknownKind => "unknown question type",
            Self::UnknownDifficulty => "unknown difficulty",
            Self::ChoiceCount => "multiple-choice question without exactly three incorrect answers",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;

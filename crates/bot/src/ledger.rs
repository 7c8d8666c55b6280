use core::fmt::{self, Display};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    DuplicateSubmission,
    EmptyAnswer,
    WindowClosed,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DuplicateSubmission => "You've already answered!",
            Self::EmptyAnswer => "Invalid answer! (Empty)",
            Self::WindowClosed => "There is no open question right now.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Answers in the order they were received.
pub type Submissions = Vec<(Box<str>, Box<str>)>;

#[derive(Default)]
struct State {
    submissions: Submissions,
    sealed: bool,
}

/// Write-once record of the answers given during a single round.
#[derive(Default)]
pub struct Ledger {
    state: Mutex<State>,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the participant's answer. Surrounding whitespace is dropped.
    pub fn submit(&self, participant: &str, answer: &str) -> Result<()> {
        let mut state = self.lock();
        if state.sealed {
            return Err(Error::WindowClosed);
        }

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::EmptyAnswer);
        }

        if state.submissions.iter().any(|(who, _)| who.eq_ignore_ascii_case(participant)) {
            return Err(Error::DuplicateSubmission);
        }

        state.submissions.push((participant.into(), answer.into()));
        Ok(())
    }

    /// Closes the ledger to further submissions and returns what it holds.
    pub fn seal(&self) -> Submissions {
        let mut state = self.lock();
        state.sealed = true;
        state.submissions.clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    pub fn len(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

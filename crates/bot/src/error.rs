use crate::ledger;
use core::fmt::{self, Display};

/// Failures of a chat command. Every variant is reported to the caller as a
/// private notice rendered through [`Display`].
#[derive(Debug)]
pub enum Error {
    /// A restricted command from someone other than the owner. Worded like
    /// [`Error::UnknownCommand`] so that strangers cannot discover owner commands.
    Unauthorized,
    UnknownCommand,
    /// Wrong number of arguments. Carries the command's usage line.
    InvalidParams(&'static str),
    /// The bot has not joined the named channel.
    UnknownChannel,
    /// The command was sent privately but needs a channel.
    NotInChannel,
    Fetch(bank::error::Error),
    Submission(ledger::Error),
}

impl From<bank::error::Error> for Error {
    fn from(err: bank::error::Error) -> Self {
        Self::Fetch(err)
    }
}

impl From<ledger::Error> for Error {
    fn from(err: ledger::Error) -> Self {
        Self::Submission(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized | Self::UnknownCommand => f.write_str("Unknown command!"),
            Self::InvalidParams(usage) => write!(f, "Invalid parameters. Usage: {usage}"),
            Self::UnknownChannel => f.write_str("I am not in that channel."),
            Self::NotInChannel => f.write_str("This command only works inside a channel."),
            Self::Fetch(err) => write!(f, "Error: Couldn't load questions ({err})"),
            Self::Submission(err) => Display::fmt(err, f),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

use bot::{
    lifecycle::{Endpoint, Identity},
    session::Rules,
    Settings,
};
use core::{
    fmt::{self, Display},
    time::Duration,
};
use std::env;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Missing(&'static str),
    Invalid(&'static str),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "missing environment variable {var}"),
            Self::Invalid(var) => write!(f, "invalid value for environment variable {var}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// Everything the bot needs to start.
#[derive(Debug)]
pub struct Config {
    pub endpoint: Endpoint,
    pub identity: Identity,
    pub autojoin: Vec<Box<str>>,
    pub settings: Settings,
    /// Minimum spacing between outgoing lines.
    pub line_rate: Duration,
    pub trivia_url: Box<str>,
}

fn flag(var: &'static str, value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Invalid(var)),
    }
}

/// Treats blank values as unset.
fn optional(value: Option<String>) -> Option<Box<str>> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty()).map(String::into_boxed_str)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |var: &'static str| optional(lookup(var)).ok_or(Error::Missing(var));

        let host = required("IRC_HOST")?;
        let port = match optional(lookup("IRC_PORT")) {
            Some(port) => port.parse().map_err(|_| Error::Invalid("IRC_PORT"))?,
            None => 6667,
        };

        let nick = required("IRC_NICK")?;
        let username = optional(lookup("IRC_USERNAME")).unwrap_or_else(|| nick.clone());
        let realname = optional(lookup("IRC_REALNAME")).unwrap_or_else(|| nick.clone());
        let modes = match lookup("IRC_MODES") {
            Some(modes) => optional(Some(modes)),
            None => Some("+B".into()),
        };
        let identity = Identity { nick, password: optional(lookup("IRC_PASSWORD")), username, realname, modes };

        let autojoin: Vec<Box<str>> = lookup("IRC_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|channel| !channel.is_empty())
            .map(Box::from)
            .collect();

        let line_rate = match optional(lookup("BOT_LINE_RATE")) {
            Some(rate) => {
                let secs: f64 = rate.parse().map_err(|_| Error::Invalid("BOT_LINE_RATE"))?;
                Duration::try_from_secs_f64(secs).map_err(|_| Error::Invalid("BOT_LINE_RATE"))?
            }
            None => Duration::from_secs(1),
        };

        let mut rules = Rules::default();
        if let Some(count) = optional(lookup("TRIVIA_QUESTIONS")) {
            // The bank hands out at most 50 questions per request.
            rules.questions = count
                .parse()
                .ok()
                .filter(|count| (1..=50).contains(count))
                .ok_or(Error::Invalid("TRIVIA_QUESTIONS"))?;
        }

        let settings = Settings {
            owner: required("BOT_OWNER")?,
            prefix: optional(lookup("BOT_PREFIX")).unwrap_or_else(|| "@".into()),
            rules,
            kick_rejoin: flag("BOT_KICK_REJOIN", lookup("BOT_KICK_REJOIN"))?,
            join_invite: flag("BOT_JOIN_INVITE", lookup("BOT_JOIN_INVITE"))?,
        };

        Ok(Self {
            endpoint: Endpoint { host, port },
            identity,
            autojoin,
            settings,
            line_rate,
            trivia_url: optional(lookup("TRIVIA_URL")).unwrap_or_else(|| bank::DEFAULT_ENDPOINT.into()),
        })
    }
}

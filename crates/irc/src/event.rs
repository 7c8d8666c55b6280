/// A raw protocol line split into its components. Message tags are skipped.
#[derive(Debug, PartialEq, Eq)]
pub struct Message<'a> {
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

pub fn parse(line: &str) -> Option<Message<'_>> {
    let mut rest = line.trim_end_matches(|c: char| c == '\r' || c == '\n');

    if let Some(tagged) = rest.strip_prefix('@') {
        rest = tagged.split_once(' ')?.1.trim_start_matches(' ');
    }

    let prefix = match rest.strip_prefix(':') {
        Some(prefixed) => {
            let (prefix, tail) = prefixed.split_once(' ')?;
            rest = tail.trim_start_matches(' ');
            Some(prefix)
        }
        None => None,
    };

    let (command, mut tail) = rest.split_once(' ').unwrap_or((rest, ""));
    if command.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    loop {
        tail = tail.trim_start_matches(' ');
        if tail.is_empty() {
            break;
        }

        if let Some(trailing) = tail.strip_prefix(':') {
            params.push(trailing);
            break;
        }

        match tail.split_once(' ') {
            Some((param, next)) => {
                params.push(param);
                tail = next;
            }
            None => {
                params.push(tail);
                break;
            }
        }
    }

    Some(Message { prefix, command, params })
}

/// Origin of a message in `nick!user@host` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub nick: Box<str>,
    pub mask: Box<str>,
}

impl From<&str> for Source {
    fn from(prefix: &str) -> Self {
        let nick = prefix.split_once('!').map_or(prefix, |(nick, _)| nick);
        Self { nick: nick.into(), mask: prefix.into() }
    }
}

/// Protocol events the bot reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Registration succeeded (`001`). Carries the nick the server assigned.
    Welcome { nick: Box<str> },
    /// Our requested nick is taken (`433`).
    NickInUse,
    Ping { token: Box<str> },
    Message { source: Source, target: Box<str>, text: Box<str> },
    Notice { source: Option<Source>, target: Box<str>, text: Box<str> },
    Joined { nick: Box<str>, channel: Box<str> },
    Parted { nick: Box<str>, channel: Box<str> },
    Kicked { channel: Box<str>, victim: Box<str>, kicker: Box<str>, reason: Box<str> },
    Invited { inviter: Box<str>, channel: Box<str> },
    /// The server is about to close the link.
    Error { reason: Box<str> },
    Other,
}

impl Event {
    pub fn from_line(line: &str) -> Option<Self> {
        parse(line).map(Self::from)
    }
}

impl From<Message<'_>> for Event {
    fn from(Message { prefix, command, params }: Message<'_>) -> Self {
        let source = prefix.map(Source::from);
        match (command, params.as_slice(), source) {
            ("001", [nick, ..], _) => Self::Welcome { nick: (*nick).into() },
            ("433", ..) => Self::NickInUse,
            ("PING", [token, ..], _) => Self::Ping { token: (*token).into() },
            ("PING", [], _) => Self::Ping { token: "".into() },
            ("PRIVMSG", [target, text], Some(source)) => {
                Self::Message { source, target: (*target).into(), text: (*text).into() }
            }
            ("NOTICE", [target, text], source) => Self::Notice { source, target: (*target).into(), text: (*text).into() },
            ("JOIN", [channel, ..], Some(Source { nick, .. })) => Self::Joined { nick, channel: (*channel).into() },
            ("PART", [channel, ..], Some(Source { nick, .. })) => Self::Parted { nick, channel: (*channel).into() },
            ("KICK", [channel, victim, rest @ ..], Some(Source { nick, .. })) => Self::Kicked {
                channel: (*channel).into(),
                victim: (*victim).into(),
                kicker: nick,
                reason: rest.first().copied().unwrap_or_default().into(),
            },
            ("INVITE", [_, channel], Some(Source { nick, .. })) => {
                Self::Invited { inviter: nick, channel: (*channel).into() }
            }
            ("ERROR", [reason, ..], _) => Self::Error { reason: (*reason).into() },
            _ => Self::Other,
        }
    }
}

use core::fmt::{self, Display};

/// Outgoing protocol lines. [`Display`] renders the wire form without the
/// terminating CRLF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Pass(Box<str>),
    Nick(Box<str>),
    User { username: Box<str>, realname: Box<str> },
    Join { channel: Box<str>, key: Option<Box<str>> },
    Part { channel: Box<str> },
    Privmsg { target: Box<str>, text: Box<str> },
    Notice { target: Box<str>, text: Box<str> },
    Mode { target: Box<str>, modes: Box<str> },
    Pong { token: Box<str> },
    Quit { message: Box<str> },
}

impl Command {
    pub fn privmsg(target: &str, text: impl Into<Box<str>>) -> Self {
        Self::Privmsg { target: target.into(), text: text.into() }
    }

    pub fn notice(target: &str, text: impl Into<Box<str>>) -> Self {
        Self::Notice { target: target.into(), text: text.into() }
    }
}

/// Strips line breaks so that user-supplied text cannot smuggle extra commands.
struct Clean<'a>(&'a str);

impl Display for Clean<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in self.0.split(|c: char| matches!(c, '\r' | '\n' | '\0')) {
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(pass) => write!(f, "PASS {}", Clean(pass)),
            Self::Nick(nick) => write!(f, "NICK {}", Clean(nick)),
            Self::User { username, realname } => write!(f, "USER {} 0 * :{}", Clean(username), Clean(realname)),
            Self::Join { channel, key: Some(key) } => write!(f, "JOIN {} {}", Clean(channel), Clean(key)),
            Self::Join { channel, key: None } => write!(f, "JOIN {}", Clean(channel)),
            Self::Part { channel } => write!(f, "PART {}", Clean(channel)),
            Self::Privmsg { target, text } => write!(f, "PRIVMSG {} :{}", Clean(target), Clean(text)),
            Self::Notice { target, text } => write!(f, "NOTICE {} :{}", Clean(target), Clean(text)),
            Self::Mode { target, modes } => write!(f, "MODE {} {}", Clean(target), Clean(modes)),
            Self::Pong { token } => write!(f, "PONG :{}", Clean(token)),
            Self::Quit { message } => write!(f, "QUIT :{}", Clean(message)),
        }
    }
}

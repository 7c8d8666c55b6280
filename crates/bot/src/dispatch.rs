//! Chat command registry, parsing, and authorization.

use crate::{
    error::{Error, Result},
    session::{Host, Outcome},
    Bot,
};
use bank::Source;
use irc::Command;
use std::sync::atomic::Ordering;

/// Who may run a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Anyone,
    Owner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Name {
    Join,
    Part,
    Help,
    Quit,
    Answer,
    KickRejoin,
    JoinInvite,
    Start,
}

/// How the text after the command word is split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// Between `min` and `max` whitespace-separated words.
    Words { min: usize, max: usize },
    /// A channel, then the rest of the line untouched.
    ChannelAndText,
}

#[derive(Debug)]
pub struct Descriptor {
    pub name: Name,
    pub keyword: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
    pub tier: Tier,
    pub arity: Arity,
}

pub static COMMANDS: &[Descriptor] = &[
    Descriptor {
        name: Name::Join,
        keyword: "join",
        aliases: &[],
        usage: "join <channel> [<password>]",
        description: "Join a channel.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 1, max: 2 },
    },
    Descriptor {
        name: Name::Part,
        keyword: "part",
        aliases: &[],
        usage: "part <channel>",
        description: "Leave a channel.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 1, max: 1 },
    },
    Descriptor {
        name: Name::Help,
        keyword: "help",
        aliases: &[],
        usage: "help [<command>]",
        description: "Lists help about commands.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 0, max: 1 },
    },
    Descriptor {
        name: Name::Quit,
        keyword: "quit",
        aliases: &[],
        usage: "quit",
        description: "Shutdown the bot.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 0, max: 0 },
    },
    Descriptor {
        name: Name::Answer,
        keyword: "answer",
        aliases: &["a"],
        usage: "answer <channel> <answer>",
        description: "Send an answer to the current question.",
        tier: Tier::Anyone,
        arity: Arity::ChannelAndText,
    },
    Descriptor {
        name: Name::KickRejoin,
        keyword: "kickrejoin",
        aliases: &[],
        usage: "kickrejoin",
        description: "Toggle rejoining a channel after being kicked.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 0, max: 0 },
    },
    Descriptor {
        name: Name::JoinInvite,
        keyword: "joininvite",
        aliases: &[],
        usage: "joininvite",
        description: "Toggle joining channels we are invited to.",
        tier: Tier::Owner,
        arity: Arity::Words { min: 0, max: 0 },
    },
    Descriptor {
        name: Name::Start,
        keyword: "start",
        aliases: &[],
        usage: "start",
        description: "Start a trivia game in this channel.",
        tier: Tier::Anyone,
        arity: Arity::Words { min: 0, max: 0 },
    },
];

impl Descriptor {
    pub fn matches(&self, word: &str) -> bool {
        self.keyword == word || self.aliases.contains(&word)
    }

    pub fn words<'a>(&self, args: &'a str) -> Result<Vec<&'a str>> {
        let words: Vec<_> = args.split_whitespace().collect();
        match self.arity {
            Arity::Words { min, max } if (min..=max).contains(&words.len()) => Ok(words),
            _ => Err(Error::InvalidParams(self.usage)),
        }
    }

    pub fn channel_and_text<'a>(&self, args: &'a str) -> Result<(&'a str, &'a str)> {
        match self.arity {
            Arity::ChannelAndText => {
                args.trim_start().split_once(char::is_whitespace).ok_or(Error::InvalidParams(self.usage))
            }
            Arity::Words { .. } => Err(Error::InvalidParams(self.usage)),
        }
    }
}

pub fn lookup(word: &str) -> Option<&'static Descriptor> {
    COMMANDS.iter().find(|command| command.matches(word))
}

/// A prefixed chat line split into the command word and everything after it.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub word: &'a str,
    pub args: &'a str,
}

pub fn parse<'a>(prefix: &str, text: &'a str) -> Option<Invocation<'a>> {
    let rest = text.strip_prefix(prefix)?;
    let (word, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if word.is_empty() {
        return None;
    }
    Some(Invocation { word, args })
}

/// Resolves the command for a caller. Strangers cannot tell restricted
/// commands apart from unknown ones.
pub fn authorize(word: &str, is_owner: bool) -> Result<&'static Descriptor> {
    let command = lookup(word).ok_or(Error::UnknownCommand)?;
    match command.tier {
        Tier::Owner if !is_owner => Err(Error::Unauthorized),
        _ => Ok(command),
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with(|c: char| matches!(c, '#' | '&' | '+' | '!'))
}

struct Request {
    caller: Box<str>,
    /// Where the command was said, unless it came in privately.
    channel: Option<Box<str>>,
    command: &'static Descriptor,
    args: Box<str>,
}

impl<B: Source> Bot<B> {
    /// Handles a `PRIVMSG`. Authorized commands run on their own task.
    pub fn on_message(&self, source: &irc::Source, target: &str, text: &str) {
        let Some(Invocation { word, args }) = parse(&self.inner.prefix, text) else {
            return;
        };

        let caller = source.nick.as_ref();
        let command = match authorize(word, caller == self.inner.owner.as_ref()) {
            Ok(command) => command,
            Err(err) => {
                log::debug!("{caller} tried `{word}`: {err:?}");
                self.inner.outbox.notice(caller, err.to_string());
                return;
            }
        };

        let request = Request {
            caller: caller.into(),
            channel: is_channel(target).then(|| target.into()),
            command,
            args: args.into(),
        };

        let bot = self.clone();
        tokio::spawn(async move {
            if let Err(err) = bot.execute(&request).await {
                log::debug!("{} failed for {}: {err:?}", request.command.keyword, request.caller);
                bot.inner.outbox.notice(&request.caller, err.to_string());
            }
        });
    }

    fn describe(&self, command: &Descriptor) -> String {
        let mut line = format!("{}{} - {}", self.inner.prefix, command.usage, command.description);
        if !command.aliases.is_empty() {
            line.push_str(" Aliases: ");
            line.push_str(&command.aliases.join(", "));
        }
        line
    }

    async fn execute(&self, request: &Request) -> Result<()> {
        let Request { caller, channel, command, args } = request;
        let outbox = &self.inner.outbox;
        match command.name {
            Name::Join => {
                let (channel, key) = match command.words(args)?.as_slice() {
                    [channel] => (Box::from(*channel), None),
                    [channel, key] => (Box::from(*channel), Some(Box::from(*key))),
                    _ => return Err(Error::InvalidParams(command.usage)),
                };
                outbox.send(Command::Join { channel, key });
            }
            Name::Part => {
                let words = command.words(args)?;
                let [channel] = words.as_slice() else {
                    return Err(Error::InvalidParams(command.usage));
                };
                outbox.send(Command::Part { channel: (*channel).into() });
            }
            Name::Help => match command.words(args)?.as_slice() {
                [] => {
                    outbox.notice(caller, "Commands:");
                    for entry in COMMANDS {
                        outbox.notice(caller, self.describe(entry));
                    }
                }
                [word] => {
                    let entry = lookup(word).ok_or(Error::UnknownCommand)?;
                    outbox.notice(caller, self.describe(entry));
                }
                _ => return Err(Error::InvalidParams(command.usage)),
            },
            Name::Quit => {
                command.words(args)?;
                self.request_shutdown();
            }
            Name::Answer => {
                let (channel, text) = command.channel_and_text(args)?;
                let session = self.session(channel).ok_or(Error::UnknownChannel)?;
                session.submit(caller, text)?;
                log::debug!("{caller} answered in {channel}");
            }
            Name::KickRejoin => {
                command.words(args)?;
                let enabled = !self.inner.kick_rejoin.fetch_xor(true, Ordering::Relaxed);
                outbox.notice(caller, format!("Kickrejoin: {enabled}"));
            }
            Name::JoinInvite => {
                command.words(args)?;
                let enabled = !self.inner.join_invite.fetch_xor(true, Ordering::Relaxed);
                outbox.notice(caller, format!("Joininvite: {enabled}"));
            }
            Name::Start => {
                command.words(args)?;
                let channel = channel.as_deref().ok_or(Error::NotInChannel)?;
                let session = self.session(channel).ok_or(Error::UnknownChannel)?;
                log::info!("{caller} started a game in {channel}");

                let host = Host {
                    bank: &self.inner.bank,
                    outbox,
                    rules: &self.inner.rules,
                    prefix: &self.inner.prefix,
                };
                match session.play(host).await? {
                    Outcome::Finished(ranking) => log::debug!("{channel} final ranking: {ranking:?}"),
                    Outcome::Superseded => log::debug!("game in {channel} was replaced"),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bot, question, secs, texts, Canned};
    use bank::{Difficulty, Kind};
    use irc::Event;
    use tokio::time;

    fn say(bot: &Bot<Canned>, nick: &str, target: &str, text: &str) {
        let source = irc::Source::from(format!("{nick}!{nick}@example.net").as_str());
        bot.on_event(Event::Message { source, target: target.into(), text: text.into() });
    }

    /// Lets spawned handlers run to their first suspension point.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn in_trivia(bank: Canned) -> (Bot<Canned>, tokio::sync::mpsc::UnboundedReceiver<Command>) {
        let (bot, rx) = bot(bank);
        bot.on_event(Event::Joined { nick: "TriviaBot".into(), channel: "#trivia".into() });
        (bot, rx)
    }

    fn quiz() -> Canned {
        Canned::Questions(vec![
            question("Capital of France?", Kind::Multiple, Difficulty::Easy, "Paris", &["Rome", "Berlin", "Madrid"]),
            question("Is the sky blue?", Kind::Boolean, Difficulty::Medium, "true", &["false"]),
        ])
    }

    #[test]
    fn splits_word_from_arguments() {
        let invocation = parse("@", "@answer #trivia New York").unwrap();
        assert_eq!(invocation, Invocation { word: "answer", args: "#trivia New York" });
        assert_eq!(parse("@", "@start"), Some(Invocation { word: "start", args: "" }));
        assert_eq!(parse("!!", "!!help join"), Some(Invocation { word: "help", args: "join" }));
        assert_eq!(parse("@", "hello @start"), None);
        assert_eq!(parse("@", "@"), None);
        assert_eq!(parse("@", "@ start"), None);
    }

    #[test]
    fn answer_keeps_the_rest_of_the_line() {
        let answer = lookup("a").unwrap();
        assert_eq!(answer.name, Name::Answer);
        assert_eq!(answer.channel_and_text("#trivia New  York").unwrap(), ("#trivia", "New  York"));
        assert!(matches!(answer.channel_and_text("#trivia"), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn checks_word_counts() {
        let join = lookup("join").unwrap();
        assert_eq!(join.words("#a").unwrap(), ["#a"]);
        assert_eq!(join.words(" #a  key ").unwrap(), ["#a", "key"]);
        assert!(matches!(join.words(""), Err(Error::InvalidParams("join <channel> [<password>]"))));
        assert!(matches!(join.words("#a key extra"), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn only_owner_runs_restricted_commands() {
        assert!(matches!(authorize("join", false), Err(Error::Unauthorized)));
        assert!(matches!(authorize("bogus", false), Err(Error::UnknownCommand)));
        assert!(matches!(authorize("bogus", true), Err(Error::UnknownCommand)));
        assert_eq!(authorize("join", true).unwrap().name, Name::Join);
        assert_eq!(authorize("start", false).unwrap().name, Name::Start);
        assert_eq!(authorize("a", false).unwrap().name, Name::Answer);
        assert_eq!(Error::Unauthorized.to_string(), Error::UnknownCommand.to_string());
    }

    #[test]
    fn registry_has_unique_keywords() {
        for (i, command) in COMMANDS.iter().enumerate() {
            for other in &COMMANDS[i + 1..] {
                assert!(!other.matches(command.keyword));
                assert!(command.aliases.iter().all(|alias| !other.matches(alias)));
            }
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejects_strangers_immediately() {
        let (bot, mut rx) = bot(Canned::Questions(Vec::new()));
        say(&bot, "mallory", "#trivia", "@join #evil");
        say(&bot, "mallory", "TriviaBot", "@bogus");
        say(&bot, "boss", "TriviaBot", "@bogus");
        assert_eq!(
            texts(&mut rx),
            ["NOTICE mallory :Unknown command!", "NOTICE mallory :Unknown command!", "NOTICE boss :Unknown command!"]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn owner_manages_membership() {
        let (bot, mut rx) = bot(Canned::Questions(Vec::new()));
        say(&bot, "boss", "TriviaBot", "@join #secret hunter2");
        say(&bot, "boss", "TriviaBot", "@part");
        settle().await;

        let lines = texts(&mut rx);
        assert!(lines.contains(&"JOIN #secret hunter2".to_owned()));
        assert!(lines.contains(&"NOTICE boss :Invalid parameters. Usage: part <channel>".to_owned()));

        say(&bot, "boss", "TriviaBot", "@part #secret");
        settle().await;
        assert_eq!(texts(&mut rx), ["PART #secret"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn toggles_flags() {
        let (bot, mut rx) = bot(Canned::Questions(Vec::new()));
        say(&bot, "boss", "TriviaBot", "@kickrejoin");
        settle().await;
        say(&bot, "boss", "TriviaBot", "@joininvite");
        settle().await;
        say(&bot, "boss", "TriviaBot", "@kickrejoin");
        settle().await;

        assert_eq!(texts(&mut rx), ["NOTICE boss :Kickrejoin: true", "NOTICE boss :Joininvite: true", "NOTICE boss :Kickrejoin: false"]);
        assert!(!bot.kick_rejoin());
        assert!(bot.join_invite());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lists_help() {
        let (bot, mut rx) = bot(Canned::Questions(Vec::new()));
        say(&bot, "boss", "TriviaBot", "@help");
        settle().await;

        let lines = texts(&mut rx);
        assert_eq!(lines.len(), COMMANDS.len() + 1);
        assert_eq!(lines[0], "NOTICE boss :Commands:");
        assert_eq!(lines[1], "NOTICE boss :@join <channel> [<password>] - Join a channel.");

        say(&bot, "boss", "TriviaBot", "@help a");
        settle().await;
        assert_eq!(
            texts(&mut rx),
            ["NOTICE boss :@answer <channel> <answer> - Send an answer to the current question. Aliases: a"]
        );

        say(&bot, "boss", "TriviaBot", "@help nothing");
        settle().await;
        assert_eq!(texts(&mut rx), ["NOTICE boss :Unknown command!"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn quit_requests_shutdown() {
        let (bot, mut rx) = bot(Canned::Questions(Vec::new()));
        say(&bot, "boss", "TriviaBot", "@quit");
        settle().await;
        assert!(bot.is_quitting());
        assert_eq!(texts(&mut rx), ["QUIT :Shutting down."]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reports_bad_answers_privately() {
        let (bot, mut rx) = in_trivia(quiz());
        say(&bot, "alice", "TriviaBot", "@a #elsewhere Paris");
        say(&bot, "alice", "TriviaBot", "@a #trivia Paris");
        say(&bot, "alice", "TriviaBot", "@a #trivia");
        say(&bot, "alice", "TriviaBot", "@start");
        settle().await;

        assert_eq!(
            texts(&mut rx),
            [
                "NOTICE alice :I am not in that channel.",
                "NOTICE alice :There is no open question right now.",
                "NOTICE alice :Invalid parameters. Usage: answer <channel> <answer>",
                "NOTICE alice :This command only works inside a channel.",
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fetch_failure_notices_requester() {
        let (bot, mut rx) = in_trivia(Canned::Refuse(2));
        say(&bot, "alice", "#trivia", "@start");
        settle().await;

        assert_eq!(texts(&mut rx), ["NOTICE alice :Error: Couldn't load questions (Code: 2)"]);
        assert_eq!(bot.session("#trivia").unwrap().phase(), crate::session::Phase::Idle);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn plays_a_game_end_to_end() {
        let (bot, mut rx) = in_trivia(quiz());
        say(&bot, "alice", "#trivia", "@start");
        settle().await;

        time::sleep(secs(31)).await;
        say(&bot, "alice", "TriviaBot", "@a #trivia Paris");
        say(&bot, "bob", "TriviaBot", "@answer #TRIVIA paris");
        settle().await;
        say(&bot, "bob", "TriviaBot", "@a #trivia Rome");
        settle().await;

        time::sleep(secs(60)).await;
        say(&bot, "alice", "TriviaBot", "@a #trivia false");
        say(&bot, "bob", "TriviaBot", "@a #trivia true");
        settle().await;

        time::sleep(secs(60)).await;
        let lines = texts(&mut rx);
        let notices: Vec<_> = lines.iter().filter(|line| line.starts_with("NOTICE")).collect();
        assert_eq!(notices, ["NOTICE bob :You've already answered!"]);
        assert_eq!(
            &lines[lines.len() - 3..],
            ["PRIVMSG #trivia :=== Scores (Only Top 3) ===", "PRIVMSG #trivia :bob: 3", "PRIVMSG #trivia :alice: 1"]
        );
        assert_eq!(bot.session("#trivia").unwrap().phase(), crate::session::Phase::Idle);
    }
}

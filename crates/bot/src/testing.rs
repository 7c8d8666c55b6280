use crate::{sender::Outbox, session::Rules, Bot, Settings};
use bank::{error, Difficulty, Kind, Question, QuestionSet, Source};
use core::time::Duration;
use irc::Command;
use tokio::sync::mpsc::UnboundedReceiver;

/// Question bank that serves fixed content.
pub enum Canned {
    Questions(Vec<Question>),
    /// Answers with the given non-zero response code.
    Refuse(u8),
    /// Serves the questions after a delay.
    Slow(Duration, Vec<Question>),
}

impl Source for Canned {
    async fn fetch(&self, count: u8) -> error::Result<QuestionSet> {
        Ok(match self {
            Self::Questions(questions) => {
                QuestionSet { response_code: 0, results: questions.iter().take(count.into()).cloned().collect() }
            }
            Self::Refuse(code) => QuestionSet { response_code: *code, results: Vec::new() },
            Self::Slow(delay, questions) => {
                tokio::time::sleep(*delay).await;
                QuestionSet { response_code: 0, results: questions.iter().take(count.into()).cloned().collect() }
            }
        })
    }
}

pub fn question(text: &str, kind: Kind, difficulty: Difficulty, correct: &str, incorrect: &[&str]) -> Question {
    Question {
        text: text.into(),
        category: "General".into(),
        kind,
        difficulty,
        correct: correct.into(),
        incorrect: incorrect.iter().map(|&answer| Box::from(answer)).collect(),
    }
}

pub const fn secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Drains every queued line in wire form.
pub fn texts(rx: &mut UnboundedReceiver<Command>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(command) = rx.try_recv() {
        lines.push(command.to_string());
    }
    lines
}

/// Owned by `boss`, with the `@` prefix and two-question games.
pub fn settings() -> Settings {
    Settings {
        owner: "boss".into(),
        prefix: "@".into(),
        rules: Rules { questions: 2, intro: secs(30), window: secs(60) },
        kick_rejoin: false,
        join_invite: false,
    }
}

/// A bot named `TriviaBot` whose outgoing lines land in the returned receiver.
pub fn bot(bank: Canned) -> (Bot<Canned>, UnboundedReceiver<Command>) {
    let (outbox, rx) = Outbox::detached();
    (Bot::new(bank, outbox, "TriviaBot", settings()), rx)
}

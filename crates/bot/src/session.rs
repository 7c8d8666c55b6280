use crate::{
    error::{Error, Result},
    ledger::{self, Ledger},
    sender::Outbox,
};
use bank::{Kind, Question, Source};
use core::time::Duration;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{sync::watch, time};

/// Where a channel's game currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Announcing,
    PreRoundWait,
    Asking,
    CollectingAnswers,
    Scoring,
    Finished,
}

/// Game parameters shared by every channel.
#[derive(Clone, Debug)]
pub struct Rules {
    /// Questions requested per game.
    pub questions: u8,
    /// Delay between the instructions and the first question.
    pub intro: Duration,
    /// How long each question accepts answers.
    pub window: Duration,
}

impl Default for Rules {
    fn default() -> Self {
        Self { questions: 10, intro: Duration::from_secs(30), window: Duration::from_secs(60) }
    }
}

/// Points per participant, in order of their first submission. Nicks compare
/// ASCII case-insensitively and keep their first spelling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scores(Vec<(Box<str>, u32)>);

impl Scores {
    fn entry(&mut self, participant: &str) -> &mut u32 {
        let index = match self.0.iter().position(|(who, _)| who.eq_ignore_ascii_case(participant)) {
            Some(index) => index,
            None => {
                self.0.push((participant.into(), 0));
                self.0.len() - 1
            }
        };
        &mut self.0[index].1
    }

    pub fn get(&self, participant: &str) -> Option<u32> {
        self.0.iter().find(|(who, _)| who.eq_ignore_ascii_case(participant)).map(|(_, points)| *points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Standings by descending score. Ties keep the order in which the
    /// participants first answered.
    pub fn ranking(&self) -> Vec<(Box<str>, u32)> {
        let mut ranking = self.0.clone();
        ranking.sort_by(|(_, a), (_, b)| b.cmp(a));
        ranking
    }
}

#[derive(Default)]
struct Game {
    phase: Phase,
    questions: Option<Arc<[Question]>>,
    current: usize,
    ledger: Option<Arc<Ledger>>,
    scores: Scores,
    /// Starts still waiting on the bank.
    fetching: u32,
}

impl Game {
    /// An empty game that still remembers pending fetches.
    fn waiting(fetching: u32) -> Self {
        let phase = if fetching == 0 { Phase::Idle } else { Phase::Loading };
        Self { phase, fetching, ..Self::default() }
    }
}

/// Held by the task running a game. Becomes stale once the session's
/// generation moves on.
struct Ticket {
    generation: u64,
    watch: watch::Receiver<u64>,
}

async fn superseded(watch: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *watch.borrow_and_update() != generation {
            return;
        }

        if watch.changed().await.is_err() {
            return;
        }
    }
}

impl Ticket {
    /// Sleeps for `duration`. Returns `false` as soon as the game is superseded.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            () = time::sleep(duration) => true,
            () = superseded(&mut self.watch, self.generation) => false,
        }
    }
}

/// Collaborators that a running game talks to.
pub struct Host<'a, B> {
    pub bank: &'a B,
    pub outbox: &'a Outbox,
    pub rules: &'a Rules,
    pub prefix: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The game ran to completion. Carries the full ranking.
    Finished(Vec<(Box<str>, u32)>),
    /// A newer game or the bot leaving the channel cut this one short.
    Superseded,
}

/// Trivia state of a single joined channel.
pub struct Session {
    channel: Box<str>,
    /// Bumped whenever the running game is replaced or thrown away.
    generation: watch::Sender<u64>,
    game: Mutex<Game>,
}

impl Session {
    pub fn new(channel: &str) -> Self {
        let (generation, _) = watch::channel(0);
        Self { channel: channel.into(), generation, game: Mutex::default() }
    }

    fn lock(&self) -> MutexGuard<'_, Game> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Index of the question being played.
    pub fn current(&self) -> usize {
        self.lock().current
    }

    pub fn total(&self) -> usize {
        self.lock().questions.as_ref().map_or(0, |questions| questions.len())
    }

    pub fn scores(&self) -> Scores {
        self.lock().scores.clone()
    }

    /// Records an answer for the round in progress.
    pub fn submit(&self, participant: &str, answer: &str) -> ledger::Result<()> {
        let ledger = self.lock().ledger.clone().ok_or(ledger::Error::WindowClosed)?;
        ledger.submit(participant, answer)
    }

    /// Throws away any game in progress. Its task wakes up and exits quietly.
    pub fn retire(&self) {
        let mut game = self.lock();
        self.generation.send_modify(|generation| *generation += 1);
        *game = Game::default();
    }

    /// Marks a fetch as pending. Returns the generation it was started under.
    fn begin_loading(&self) -> u64 {
        let mut game = self.lock();
        game.fetching += 1;
        if game.phase == Phase::Idle {
            game.phase = Phase::Loading;
        }
        *self.generation.borrow()
    }

    fn abort_loading(&self, generation: u64) {
        let mut game = self.lock();
        if *self.generation.borrow() != generation {
            return;
        }

        game.fetching = game.fetching.saturating_sub(1);
        if game.fetching == 0 && game.phase == Phase::Loading {
            game.phase = Phase::Idle;
        }
    }

    /// Replaces whatever game is running with a fresh one over `questions`.
    /// Refuses if the session moved on while the questions were being fetched.
    fn install(&self, questions: Arc<[Question]>, generation: u64) -> Option<Ticket> {
        let mut game = self.lock();
        if *self.generation.borrow() != generation {
            return None;
        }

        self.generation.send_modify(|generation| *generation += 1);
        *game = Game { phase: Phase::Announcing, questions: Some(questions), ..Game::default() };
        Some(Ticket { generation: *self.generation.borrow(), watch: self.generation.subscribe() })
    }

    /// Runs `f` on the game, unless the ticket is stale.
    fn with<R>(&self, ticket: &Ticket, f: impl FnOnce(&mut Game) -> R) -> Option<R> {
        let mut game = self.lock();
        if *self.generation.borrow() != ticket.generation {
            return None;
        }
        Some(f(&mut game))
    }

    fn advance(&self, ticket: &Ticket, phase: Phase) -> bool {
        self.with(ticket, |game| game.phase = phase).is_some()
    }

    fn say(&self, outbox: &Outbox, text: impl Into<Box<str>>) {
        outbox.message(&self.channel, text);
    }

    /// Plays a full game: fetch, instructions, every round, then the ranking.
    pub async fn play<B: Source>(self: Arc<Self>, host: Host<'_, B>) -> Result<Outcome> {
        let started = self.begin_loading();
        let set = match host.bank.fetch(host.rules.questions).await.and_then(bank::check) {
            Ok(set) => set,
            Err(err) => {
                log::warn!("cannot start a game in {}: {err}", self.channel);
                self.abort_loading(started);
                return Err(Error::Fetch(err));
            }
        };

        let questions: Arc<[Question]> = set.results.into();
        let total = questions.len();
        let Some(mut ticket) = self.install(Arc::clone(&questions), started) else {
            log::debug!("dropping fetched questions for {}, the session moved on", self.channel);
            return Ok(Outcome::Superseded);
        };
        log::info!("starting a game of {total} questions in {}", self.channel);

        self.say(host.outbox, "=== Trivia Time ===");
        self.say(
            host.outbox,
            format!(
                "Answer questions by sending command '{}answer {} <answer>', you can only answer once. \
                 You have {} seconds to respond. For boolean type question answer with \"true\" or \"false\". \
                 For multiple type question answer with one of the presented answers, spelling is important. \
                 First question in {} seconds.",
                host.prefix,
                self.channel,
                host.rules.window.as_secs(),
                host.rules.intro.as_secs(),
            ),
        );

        if !self.advance(&ticket, Phase::PreRoundWait) || !ticket.pause(host.rules.intro).await {
            return Ok(Outcome::Superseded);
        }

        for (index, question) in questions.iter().enumerate() {
            if !self.round(&mut ticket, &host, index, total, question).await {
                log::debug!("game in {} was superseded during question {}", self.channel, index + 1);
                return Ok(Outcome::Superseded);
            }
        }

        let Some(ranking) = self.with(&ticket, |game| {
            game.phase = Phase::Finished;
            game.scores.ranking()
        }) else {
            return Ok(Outcome::Superseded);
        };

        if ranking.is_empty() {
            self.say(host.outbox, "Nobody answered any question.");
        } else {
            self.say(host.outbox, "=== Scores (Only Top 3) ===");
            for (participant, points) in ranking.iter().take(3) {
                self.say(host.outbox, format!("{participant}: {points}"));
            }
        }

        self.with(&ticket, |game| *game = Game::waiting(game.fetching));
        log::info!("game in {} finished with {} participants", self.channel, ranking.len());
        Ok(Outcome::Finished(ranking))
    }

    /// Asks one question, collects answers, then scores them. Returns `false`
    /// if the game was superseded along the way.
    async fn round<B>(
        &self,
        ticket: &mut Ticket,
        host: &Host<'_, B>,
        index: usize,
        total: usize,
        question: &Question,
    ) -> bool {
        let ledger = Arc::new(Ledger::default());
        let opened = self.with(ticket, |game| {
            game.phase = Phase::Asking;
            game.ledger = Some(Arc::clone(&ledger));
        });
        if opened.is_none() {
            return false;
        }

        self.say(
            host.outbox,
            format!(
                "Question {}/{total}: {} ({}, {}, {})",
                index + 1,
                question.text,
                question.category,
                question.kind,
                question.difficulty
            ),
        );

        if question.kind == Kind::Multiple {
            let mut choices = question.choices();
            choices.shuffle(&mut rand::rng());
            self.say(host.outbox, format!("Answers: {}", choices.join(", ")));
        }

        if !self.advance(ticket, Phase::CollectingAnswers) || !ticket.pause(host.rules.window).await {
            return false;
        }

        let scored = self.with(ticket, |game| {
            game.phase = Phase::Scoring;
            game.ledger = None;

            let submissions = ledger.seal();
            let mut correct = 0;
            for (participant, answer) in &submissions {
                let points = game.scores.entry(participant);
                if question.is_correct(answer) {
                    *points += question.difficulty.points();
                    correct += 1;
                }
            }

            game.current += 1;
            (submissions.len(), correct)
        });

        let Some((answered, correct)) = scored else {
            return false;
        };

        log::debug!("{}: question {} had {answered} answers, {correct} correct", self.channel, index + 1);
        self.say(host.outbox, format!("Times-up! Correct answer: {}", question.correct));
        true
    }
}

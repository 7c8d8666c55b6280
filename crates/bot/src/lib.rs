//! The trivia engine: per-channel sessions, command dispatch, the paced
//! outgoing queue, and the connection lifecycle that ties them together.

pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod sender;
pub mod session;

#[cfg(test)]
mod testing;

use bank::Source;
use dashmap::DashMap;
use irc::{Command, Event};
use sender::Outbox;
use session::{Rules, Session};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, PoisonError, RwLock,
};
use tokio::sync::Notify;

/// Message sent with our `QUIT`.
pub const QUIT_MESSAGE: &str = "Shutting down.";

/// Startup parameters of the bot.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Only this nick may run restricted commands.
    pub owner: Box<str>,
    pub prefix: Box<str>,
    pub rules: Rules,
    pub kick_rejoin: bool,
    pub join_invite: bool,
}

type Registry = DashMap<Box<str>, Arc<Session>>;

struct Inner<B> {
    bank: B,
    outbox: Outbox,
    owner: Box<str>,
    prefix: Box<str>,
    rules: Rules,
    /// One session per joined channel, keyed by the lowercased name.
    sessions: Registry,
    nick: RwLock<Box<str>>,
    kick_rejoin: AtomicBool,
    join_invite: AtomicBool,
    quitting: AtomicBool,
    shutdown: Notify,
}

/// Shared handle to the bot state. Cloning is cheap.
pub struct Bot<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Bot<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

fn key(channel: &str) -> Box<str> {
    channel.to_ascii_lowercase().into_boxed_str()
}

impl<B: Source> Bot<B> {
    pub fn new(bank: B, outbox: Outbox, nick: &str, settings: Settings) -> Self {
        let Settings { owner, prefix, rules, kick_rejoin, join_invite } = settings;
        let inner = Inner {
            bank,
            outbox,
            owner,
            prefix,
            rules,
            sessions: Registry::new(),
            nick: RwLock::new(nick.into()),
            kick_rejoin: AtomicBool::new(kick_rejoin),
            join_invite: AtomicBool::new(join_invite),
            quitting: AtomicBool::new(false),
            shutdown: Notify::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    /// The nick the server currently knows us by.
    pub fn nick(&self) -> Box<str> {
        self.inner.nick.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_nick(&self, nick: &str) {
        *self.inner.nick.write().unwrap_or_else(PoisonError::into_inner) = nick.into();
    }

    fn is_me(&self, nick: &str) -> bool {
        self.inner.nick.read().unwrap_or_else(PoisonError::into_inner).eq_ignore_ascii_case(nick)
    }

    pub fn session(&self, channel: &str) -> Option<Arc<Session>> {
        self.inner.sessions.get(&key(channel)).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of every channel we are in, sorted.
    pub fn channels(&self) -> Vec<Box<str>> {
        let mut channels: Vec<_> = self.inner.sessions.iter().map(|entry| entry.value().channel().into()).collect();
        channels.sort_unstable();
        channels
    }

    pub fn kick_rejoin(&self) -> bool {
        self.inner.kick_rejoin.load(Ordering::Relaxed)
    }

    pub fn join_invite(&self) -> bool {
        self.inner.join_invite.load(Ordering::Relaxed)
    }

    pub fn is_quitting(&self) -> bool {
        self.inner.quitting.load(Ordering::Acquire)
    }

    /// Queues our `QUIT` (once) ahead of any backlog and wakes the lifecycle so it stops reconnecting.
    pub fn request_shutdown(&self) {
        if !self.inner.quitting.swap(true, Ordering::AcqRel) {
            log::info!("shutdown requested");
            self.inner.outbox.send_urgent(Command::Quit { message: QUIT_MESSAGE.into() });
        }
        self.inner.shutdown.notify_one();
    }

    /// Resolves once [`Bot::request_shutdown`] has been called.
    pub async fn shutdown_requested(&self) {
        if self.is_quitting() {
            return;
        }
        self.inner.shutdown.notified().await;
    }

    fn enter(&self, channel: &str) {
        self.inner.sessions.entry(key(channel)).or_insert_with(|| Arc::new(Session::new(channel)));
        log::info!("joined {channel}");
    }

    fn leave(&self, channel: &str) {
        if let Some((_, session)) = self.inner.sessions.remove(&key(channel)) {
            session.retire();
        }
    }

    /// Reacts to an event received while registered.
    pub fn on_event(&self, event: Event) {
        match event {
            Event::Ping { token } => self.inner.outbox.send(Command::Pong { token }),
            Event::Message { source, target, text } => self.on_message(&source, &target, &text),
            Event::Notice { source, target, text } => {
                let from = source.as_ref().map_or("server", |source| source.nick.as_ref());
                log::info!("notice from {from}/{target}: {text}");
            }
            Event::Joined { nick, channel } if self.is_me(&nick) => self.enter(&channel),
            Event::Parted { nick, channel } if self.is_me(&nick) => {
                self.leave(&channel);
                log::info!("left {channel}");
            }
            Event::Kicked { channel, victim, kicker, reason } if self.is_me(&victim) => {
                self.leave(&channel);
                log::warn!("kicked from {channel} by {kicker}: {reason}");
                if self.kick_rejoin() {
                    self.inner.outbox.send(Command::Join { channel, key: None });
                }
            }
            Event::Invited { inviter, channel } => {
                log::info!("{inviter} invited us to {channel}");
                if self.join_invite() {
                    self.inner.outbox.send(Command::Join { channel, key: None });
                }
            }
            Event::Error { reason } => log::warn!("server error: {reason}"),
            _ => {}
        }
    }

    /// Drops every session. Running games wind down without sending anything.
    pub fn on_disconnect(&self) {
        for entry in self.inner.sessions.iter() {
            entry.value().retire();
        }
        self.inner.sessions.clear();
    }
}

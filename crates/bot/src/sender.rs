use core::{future::Future, time::Duration};
use irc::{Command, Writer};
use std::io;
use tokio::{
    io::AsyncWrite,
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

/// Anything the pacer can write protocol lines into.
pub trait Sink: Send + 'static {
    fn deliver(&mut self, command: &Command) -> impl Future<Output = io::Result<()>> + Send;
}

impl<W> Sink for Writer<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn deliver(&mut self, command: &Command) -> io::Result<()> {
        self.send(command).await
    }
}

/// Cheap handle for queueing outgoing lines. Shared by every channel and command.
#[derive(Clone)]
pub struct Outbox {
    queue: mpsc::UnboundedSender<Command>,
    /// Lines that skip ahead of the regular queue.
    urgent: mpsc::UnboundedSender<Command>,
}

impl Outbox {
    pub fn send(&self, command: Command) {
        if self.queue.send(command).is_err() {
            log::error!("outgoing queue is closed");
        }
    }

    /// Queues `command` ahead of every regular line. Still paced.
    pub fn send_urgent(&self, command: Command) {
        if self.urgent.send(command).is_err() {
            log::error!("outgoing queue is closed");
        }
    }

    pub fn message(&self, target: &str, text: impl Into<Box<str>>) {
        self.send(Command::privmsg(target, text));
    }

    pub fn notice(&self, target: &str, text: impl Into<Box<str>>) {
        self.send(Command::notice(target, text));
    }

    /// An outbox whose lines, urgent or not, are handed straight to the
    /// returned receiver.
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { queue: tx.clone(), urgent: tx }, rx)
    }
}

/// Hands connections over to the pacer.
pub struct Uplink<S>(mpsc::UnboundedSender<Option<S>>);

impl<S: Sink> Uplink<S> {
    /// Routes every following line to a freshly registered connection.
    pub fn attach(&self, sink: S) {
        if self.0.send(Some(sink)).is_err() {
            log::error!("pacer has shut down");
        }
    }

    /// Holds lines back until the next [`Uplink::attach`].
    pub fn detach(&self) {
        if self.0.send(None).is_err() {
            log::error!("pacer has shut down");
        }
    }
}

/// Drains the outbox into the current sink, at most one line per period.
pub struct Pacer<S> {
    queue: mpsc::UnboundedReceiver<Command>,
    urgent: mpsc::UnboundedReceiver<Command>,
    sinks: mpsc::UnboundedReceiver<Option<S>>,
    period: Duration,
}

pub fn channel<S: Sink>(period: Duration) -> (Outbox, Uplink<S>, Pacer<S>) {
    let (queue_tx, queue) = mpsc::unbounded_channel();
    let (urgent_tx, urgent) = mpsc::unbounded_channel();
    let (sinks_tx, sinks) = mpsc::unbounded_channel();
    let outbox = Outbox { queue: queue_tx, urgent: urgent_tx };
    (outbox, Uplink(sinks_tx), Pacer { queue, urgent, sinks, period })
}

impl<S: Sink> Pacer<S> {
    /// Runs until every [`Outbox`] is dropped, or until the [`Uplink`] is
    /// dropped while detached. Lines queued while no sink is attached wait for
    /// the next one. A line whose write fails is retried on the next sink.
    pub async fn run(mut self) {
        // Zero-length intervals are not allowed.
        let period = self.period.max(Duration::from_millis(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sink = None;
        loop {
            let command = tokio::select! {
                biased;
                Some(command) = self.urgent.recv() => command,
                Some(command) = self.queue.recv() => command,
                else => return,
            };

            loop {
                let Some(current) = self.current(&mut sink).await else {
                    log::warn!("uplink is gone, dropping `{command}`");
                    return;
                };

                interval.tick().await;
                match current.deliver(&command).await {
                    Ok(()) => break,
                    Err(err) => {
                        log::warn!("cannot send `{command}`, holding it for the next connection: {err}");
                        sink = None;
                    }
                }
            }
        }
    }

    /// The most recently attached sink. Waits while detached and gives up once
    /// the uplink is gone.
    async fn current<'s>(&mut self, sink: &'s mut Option<S>) -> Option<&'s mut S> {
        while let Ok(update) = self.sinks.try_recv() {
            *sink = update;
        }

        while sink.is_none() {
            *sink = self.sinks.recv().await?;
        }

        sink.as_mut()
    }
}

//! Registration, channel bootstrap, and reconnection with backoff.

use crate::{sender::Uplink, Bot};
use bank::Source;
use core::{
    fmt::{self, Display},
    future::Future,
    time::Duration,
};
use irc::{Command, Event, Reader, Writer};
use rand::Rng;
use std::io;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::{self, Instant},
};

/// How long we wait for the server to close the link after our `QUIT`.
pub const QUIT_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

/// Who we register as.
#[derive(Clone, Debug)]
pub struct Identity {
    pub nick: Box<str>,
    pub password: Option<Box<str>>,
    pub username: Box<str>,
    pub realname: Box<str>,
    /// User modes to set on ourselves once welcomed.
    pub modes: Option<Box<str>>,
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    pub host: Box<str>,
    pub port: u16,
}

/// Exponential reconnection delay with random jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
    pub factor: f64,
    /// Relative spread applied to every delay.
    pub jitter: f64,
    /// A connection that stays ready this long resets the delay.
    pub stable: Duration,
    current: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3600),
            factor: core::f64::consts::E,
            jitter: 0.119626565582,
            stable: Duration::from_secs(60),
            current: None,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt. Every call grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.unwrap_or(self.min);
        self.current = Some(base.mul_f64(self.factor).min(self.max));
        self.jittered(base)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Accounts for a connection that was ready for `held`.
    pub fn record(&mut self, held: Duration) {
        if held >= self.stable {
            self.reset();
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64(1.0 + spread)
    }
}

#[derive(Debug)]
pub enum ConnectionError {
    Io(io::Error),
    /// The server hung up.
    Closed,
    /// The server sent `ERROR` during registration.
    Rejected(Box<str>),
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "i/o failure: {err}"),
            Self::Closed => f.write_str("connection closed by server"),
            Self::Rejected(reason) => write!(f, "rejected by server: {reason}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

pub type Result<T> = core::result::Result<T, ConnectionError>;

/// Sends our credentials and waits for the welcome. Taken nicks get an
/// underscore appended until the server accepts one. Returns the nick we were
/// welcomed with.
pub async fn register<R, W>(reader: &mut Reader<R>, writer: &mut Writer<W>, identity: &Identity) -> Result<Box<str>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(password) = &identity.password {
        writer.send(&Command::Pass(password.clone())).await?;
    }

    let mut nick = String::from(identity.nick.as_ref());
    writer.send(&Command::Nick(nick.as_str().into())).await?;
    writer.send(&Command::User { username: identity.username.clone(), realname: identity.realname.clone() }).await?;

    loop {
        let Some(event) = reader.next_event().await? else {
            return Err(ConnectionError::Closed);
        };

        match event {
            Event::Welcome { nick } => return Ok(nick),
            Event::NickInUse => {
                nick.push('_');
                log::warn!("nick taken, trying {nick}");
                writer.send(&Command::Nick(nick.as_str().into())).await?;
            }
            Event::Ping { token } => writer.send(&Command::Pong { token }).await?,
            Event::Error { reason } => return Err(ConnectionError::Rejected(reason)),
            Event::Notice { text, .. } => log::info!("{text}"),
            _ => {}
        }
    }
}

/// Feeds events to the bot until the link drops or a shutdown is requested.
/// After a shutdown, waits up to [`QUIT_GRACE`] for the server to hang up.
pub async fn serve<R, B>(reader: &mut Reader<R>, bot: &Bot<B>) -> Result<()>
where
    R: AsyncRead + Unpin,
    B: Source,
{
    loop {
        let event = tokio::select! {
            event = reader.next_event() => event?,
            () = bot.shutdown_requested() => break,
        };

        match event {
            Some(event) => bot.on_event(event),
            None => return Err(ConnectionError::Closed),
        }
    }

    let drain = async {
        while let Some(event) = reader.next_event().await? {
            log::debug!("ignoring {event:?} while quitting");
        }
        Ok::<_, io::Error>(())
    };

    match time::timeout(QUIT_GRACE, drain).await {
        Ok(result) => result?,
        Err(_) => log::warn!("server did not close the link in time"),
    }

    Ok(())
}

/// Resolves to `None` if a shutdown is requested before `task` completes.
async fn unless_quitting<B: Source, T>(bot: &Bot<B>, task: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        value = task => Some(value),
        () = bot.shutdown_requested() => None,
    }
}

/// Keeps the bot connected until it is told to quit.
pub struct Lifecycle<B> {
    bot: Bot<B>,
    uplink: Uplink<Writer>,
    endpoint: Endpoint,
    identity: Identity,
    autojoin: Vec<Box<str>>,
    backoff: Backoff,
    state: State,
    ready_since: Option<Instant>,
}

impl<B: Source> Lifecycle<B> {
    pub fn new(
        bot: Bot<B>,
        uplink: Uplink<Writer>,
        endpoint: Endpoint,
        identity: Identity,
        autojoin: Vec<Box<str>>,
    ) -> Self {
        Self {
            bot,
            uplink,
            endpoint,
            identity,
            autojoin,
            backoff: Backoff::default(),
            state: State::Disconnected,
            ready_since: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, state: State) {
        log::info!("{:?} -> {state:?}", self.state);
        self.state = state;
    }

    /// Runs connections back to back until a shutdown is requested.
    pub async fn run(mut self) {
        while !self.bot.is_quitting() {
            let result = self.connection().await;
            self.uplink.detach();
            self.bot.on_disconnect();
            let held = self.ready_since.take().map_or(Duration::ZERO, |since| since.elapsed());
            self.transition(State::Disconnected);

            if let Err(err) = result {
                log::warn!("connection to {}:{} failed: {err}", self.endpoint.host, self.endpoint.port);
            }

            if self.bot.is_quitting() {
                break;
            }

            self.backoff.record(held);
            let delay = self.backoff.next_delay();
            log::info!("reconnecting in {:.1}s", delay.as_secs_f64());
            if unless_quitting(&self.bot, time::sleep(delay)).await.is_none() {
                break;
            }
        }

        log::info!("stopped");
    }

    /// A single connection from dial to hang-up. Returns `Ok` only when it
    /// ended because of a shutdown.
    async fn connection(&mut self) -> Result<()> {
        self.transition(State::Connecting);
        let Some(connected) = unless_quitting(&self.bot, irc::connect(&self.endpoint.host, self.endpoint.port)).await
        else {
            return Ok(());
        };
        let (mut reader, mut writer) = connected?;

        self.transition(State::Authenticating);
        let Some(registered) = unless_quitting(&self.bot, register(&mut reader, &mut writer, &self.identity)).await
        else {
            return Ok(());
        };
        let nick = registered?;

        self.bot.set_nick(&nick);
        self.uplink.attach(writer);
        self.ready_since = Some(Instant::now());
        self.transition(State::Ready);

        let outbox = self.bot.outbox();
        if let Some(modes) = &self.identity.modes {
            outbox.send(Command::Mode { target: nick, modes: modes.clone() });
        }
        for channel in &self.autojoin {
            outbox.send(Command::Join { channel: channel.clone(), key: None });
        }

        serve(&mut reader, &self.bot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sender,
        testing::{self, Canned},
    };
    use tokio::{
        io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpListener, TcpStream,
        },
    };

    fn identity() -> Identity {
        Identity {
            nick: "TriviaBot".into(),
            password: Some("secret".into()),
            username: "trivia".into(),
            realname: "Trivia Bot".into(),
            modes: Some("+B".into()),
        }
    }

    async fn registration(script: &[u8]) -> (Result<Box<str>>, Vec<String>) {
        let (client, mut server) = duplex(4096);
        server.write_all(script).await.unwrap();

        let (read, write) = split(client);
        let mut reader = Reader::new(read);
        let mut writer = Writer::new(write);
        let result = register(&mut reader, &mut writer, &identity()).await;
        drop((reader, writer));

        let mut sent = Vec::new();
        let mut lines = BufReader::new(server).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            sent.push(line);
        }
        (result, sent)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn registers_with_fallback_nick() {
        let script = b":srv 433 * TriviaBot :Nickname is already in use\r\nPING :abc\r\n:srv 001 TriviaBot_ :Welcome\r\n";
        let (result, sent) = registration(script).await;
        assert_eq!(result.unwrap().as_ref(), "TriviaBot_");
        assert_eq!(sent, ["PASS secret", "NICK TriviaBot", "USER trivia 0 * :Trivia Bot", "NICK TriviaBot_", "PONG :abc"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn registration_fails_on_server_error() {
        let (result, _) = registration(b"ERROR :Closing Link: banned\r\n").await;
        assert!(matches!(result, Err(ConnectionError::Rejected(reason)) if reason.as_ref() == "Closing Link: banned"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn registration_fails_on_hang_up() {
        let (client, server) = duplex(4096);
        drop(server);
        let (read, write) = split(client);
        let result = register(&mut Reader::new(read), &mut Writer::new(write), &identity()).await;
        assert!(matches!(result, Err(ConnectionError::Io(_) | ConnectionError::Closed)));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn serve_waits_briefly_after_shutdown() {
        let (bot, _rx) = testing::bot(Canned::Questions(Vec::new()));
        let (client, mut server) = duplex(4096);
        server.write_all(b":TriviaBot!b@h JOIN #trivia\r\n").await.unwrap();

        let mut reader = Reader::new(client);
        let serving = {
            let bot = bot.clone();
            tokio::spawn(async move { serve(&mut reader, &bot).await })
        };

        tokio::task::yield_now().await;
        assert!(bot.session("#trivia").is_some());

        let start = Instant::now();
        bot.request_shutdown();
        serving.await.unwrap().unwrap();
        assert!(start.elapsed() >= QUIT_GRACE);
        drop(server);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn serve_reports_hang_up() {
        let (bot, _rx) = testing::bot(Canned::Questions(Vec::new()));
        let (client, server) = duplex(4096);
        drop(server);
        let result = serve(&mut Reader::new(client), &bot).await;
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut backoff = Backoff { jitter: 0.0, ..Backoff::default() };
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert!((backoff.next_delay().as_secs_f64() - core::f64::consts::E).abs() < 1e-6);

        let last = (0..20).map(|_| backoff.next_delay()).last().unwrap();
        assert_eq!(last, Duration::from_secs(3600));
    }

    #[test]
    fn backoff_jitter_stays_in_bounds() {
        for _ in 0..100 {
            let delay = Backoff::default().next_delay().as_secs_f64();
            assert!((0.88..=1.12).contains(&delay), "{delay}");
        }
    }

    #[test]
    fn backoff_resets_after_stable_connection() {
        let mut backoff = Backoff { jitter: 0.0, ..Backoff::default() };
        backoff.next_delay();
        backoff.next_delay();

        backoff.record(Duration::from_secs(5));
        assert!(backoff.next_delay() > Duration::from_secs(5));

        backoff.record(Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    /// A scripted server on the other end of a real socket.
    struct Fake {
        lines: Lines<BufReader<OwnedReadHalf>>,
        write: OwnedWriteHalf,
    }

    impl Fake {
        fn new(stream: TcpStream) -> Self {
            let (read, write) = stream.into_split();
            Self { lines: BufReader::new(read).lines(), write }
        }

        async fn send(&mut self, line: &str) {
            self.write.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
        }

        /// Skips lines until `wanted` arrives.
        async fn until(&mut self, wanted: &str) {
            loop {
                let line = self.lines.next_line().await.unwrap().expect("client hung up");
                if line == wanted {
                    return;
                }
            }
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reconnects_until_quit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (outbox, uplink, pacer) = sender::channel(Duration::from_millis(1));
        let bot = Bot::new(Canned::Questions(Vec::new()), outbox, "TriviaBot", testing::settings());
        tokio::spawn(pacer.run());

        let endpoint = Endpoint { host: "127.0.0.1".into(), port };
        let backoff = Backoff { min: Duration::from_millis(10), max: Duration::from_millis(50), ..Backoff::default() };
        let lifecycle = Lifecycle::new(bot.clone(), uplink, endpoint, identity(), vec!["#trivia".into()]);
        let running = tokio::spawn(lifecycle.with_backoff(backoff).run());

        let script = async {
            let (stream, _) = listener.accept().await.unwrap();
            let mut server = Fake::new(stream);
            server.until("USER trivia 0 * :Trivia Bot").await;
            server.send(":srv 001 TriviaBot :Welcome").await;
            server.until("MODE TriviaBot +B").await;
            server.until("JOIN #trivia").await;
            server.send(":TriviaBot!bot@host JOIN #trivia").await;
            while bot.session("#trivia").is_none() {
                time::sleep(Duration::from_millis(5)).await;
            }
            drop(server);

            let (stream, _) = listener.accept().await.unwrap();
            assert!(bot.channels().is_empty());
            let mut server = Fake::new(stream);
            server.until("NICK TriviaBot").await;
            server.send(":srv 001 TriviaBot :Welcome").await;
            server.until("JOIN #trivia").await;

            bot.request_shutdown();
            server.until("QUIT :Shutting down.").await;
            drop(server);
            running.await.unwrap();
        };

        time::timeout(Duration::from_secs(10), script).await.unwrap();
        assert!(bot.is_quitting());
    }
}

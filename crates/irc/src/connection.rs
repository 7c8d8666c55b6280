use crate::{command::Command, event::Event};
use std::io;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
};

/// Opens a plain-text connection to the server.
pub async fn connect(host: &str, port: u16) -> io::Result<(Reader, Writer)> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();
    Ok((Reader::new(read), Writer::new(write)))
}

/// Incoming half of a connection.
pub struct Reader<R = OwnedReadHalf> {
    inner: BufReader<R>,
    /// Bytes of the line currently being received.
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub fn new(read: R) -> Self {
        Self { inner: BufReader::new(read), buf: Vec::new() }
    }

    /// Waits for the next recognizable event. Returns `None` once the server
    /// closes the connection.
    ///
    /// This is cancel-safe: a partially received line stays buffered until the
    /// next call.
    pub async fn next_event(&mut self) -> io::Result<Option<Event>> {
        loop {
            if self.inner.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.buf.clear();
            log::trace!("<< {}", line.trim_end());

            if let Some(event) = Event::from_line(&line) {
                return Ok(Some(event));
            }
        }
    }
}

/// Outgoing half of a connection.
pub struct Writer<W = OwnedWriteHalf> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, command: &Command) -> io::Result<()> {
        let line = format!("{command}\r\n");
        log::trace!(">> {command}");
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await
    }
}

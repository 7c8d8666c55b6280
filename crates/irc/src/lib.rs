//! Minimal IRC client plumbing: line parsing into [`Event`]s, [`Command`]
//! encoding, and a TCP [`Reader`]/[`Writer`] pair.

mod command;
mod connection;
mod event;

pub use command::Command;
pub use connection::{connect, Reader, Writer};
pub use event::{parse, Event, Message, Source};

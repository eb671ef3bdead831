use std::io;
use std::io::ErrorKind;

use thiserror::Error;

use crate::protocol::ParseError;

/// Why a session has to be evicted from its reactor.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("io error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("connection timed out")]
    TimedOut,

    #[error("websocket closed by peer")]
    Closed,

    #[error("session handler panicked: {message}")]
    Panicked { message: String },

    #[error("protocol violation: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },
}

impl SessionError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::from(e.into())
    }

    pub fn panicked<S: ToString>(message: S) -> Self {
        Self::Panicked { message: message.to_string() }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => Self::PeerClosed,
            _ => Self::Io { source: e },
        }
    }
}

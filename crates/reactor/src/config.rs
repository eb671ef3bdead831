//! Runtime knobs shared by the reactors and the protocol handlers.

use std::time::Duration;

use crate::buffer::DEFAULT_CHUNK_SIZE;

/// Default upper bound for the payload of one outgoing WebSocket frame.
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 256;

/// Value of the `Server` header on every response.
pub const DEFAULT_SERVER_NAME: &str = "micro-reactor";

/// How long a dispatch loop sleeps after an iteration with nothing to do.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Configuration of a server and the sessions it creates.
///
/// ```
/// use std::time::Duration;
/// use micro_reactor::config::ServerConfig;
///
/// let config = ServerConfig::new()
///     .chunk_size(4096)
///     .connection_timeout(Duration::from_secs(30))
///     .server_name("demo");
///
/// assert_eq!(config.get_chunk_size(), 4096);
/// assert_eq!(config.get_max_fragment_size(), 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    chunk_size: usize,
    connection_timeout: Option<Duration>,
    max_fragment_size: usize,
    server_name: String,
    idle_sleep: Duration,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity of every buffer chunk.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Evicts HTTP sessions idle for longer than `timeout`.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn without_connection_timeout(mut self) -> Self {
        self.connection_timeout = None;
        self
    }

    /// Largest payload of one outgoing WebSocket frame.
    #[must_use]
    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = size.max(1);
        self
    }

    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    #[must_use]
    pub fn idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn get_connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    pub fn get_max_fragment_size(&self) -> usize {
        self.max_fragment_size
    }

    pub fn get_server_name(&self) -> &str {
        &self.server_name
    }

    pub fn get_idle_sleep(&self) -> Duration {
        self.idle_sleep
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connection_timeout: None,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            idle_sleep: DEFAULT_IDLE_SLEEP,
        }
    }
}

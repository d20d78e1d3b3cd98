use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6881;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by the announce and handshake stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Port reported to trackers.
    pub listen_port: u16,
    /// Upper bound on a single tracker request, including reading the body.
    pub announce_timeout: Duration,
    pub connect_timeout: Duration,
    /// Deadline covering the whole handshake exchange once connected.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            listen_port: DEFAULT_PORT,
            announce_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            handshake_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Applies `timeout` to every network operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.announce_timeout = timeout;
        self.connect_timeout = timeout;
        self.handshake_timeout = timeout;
        self
    }
}

//! Connection lifecycle state, reconnect backoff and server-URI
//! derivation.

use std::time::Duration;

use crate::types::ConnectOptions;

/// Lifecycle of one client. `Reconnecting` is entered from
/// `Connecting`/`Connected` when an established session drops and the
/// options asked for automatic reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting)
    }
}

pub const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX: Duration = Duration::from_secs(128);

/// Exponential reconnect schedule: 1 s doubling per failed attempt up to
/// 128 s, reset to 1 s by a successful CONNACK.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    interval: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            interval: RECONNECT_INITIAL,
        }
    }
}

impl ReconnectBackoff {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.interval
    }

    /// A reconnect attempt failed: double, capped.
    pub fn advance(&mut self) {
        self.interval = (self.interval * 2).min(RECONNECT_MAX);
    }

    /// CONNACK arrived: the next outage starts over at one second.
    pub fn reset(&mut self) {
        self.interval = RECONNECT_INITIAL;
    }
}

/// Formats one WebSocket URI; IPv6 literals are bracketed.
#[must_use]
pub fn format_uri(use_ssl: bool, host: &str, port: u16, path: &str) -> String {
    let scheme = if use_ssl { "wss" } else { "ws" };
    if host.contains(':') {
        format!("{scheme}://[{host}]:{port}{path}")
    } else {
        format!("{scheme}://{host}:{port}{path}")
    }
}

/// Derives the failover URI list for one connect attempt: explicit `uris`
/// win, then paired `hosts`×`ports`+`path`, then the configured base URI.
#[must_use]
pub fn build_uris(base_uri: &str, options: &ConnectOptions) -> Vec<String> {
    if !options.uris.is_empty() {
        return options.uris.clone();
    }
    if !options.hosts.is_empty() {
        return options
            .hosts
            .iter()
            .zip(&options.ports)
            .map(|(host, &port)| format_uri(options.use_ssl, host, port, &options.path))
            .collect();
    }
    vec![base_uri.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_the_cap() {
        let mut backoff = ReconnectBackoff::new();
        let mut observed = Vec::new();
        for _ in 0..9 {
            observed.push(backoff.delay().as_secs());
            backoff.advance();
        }
        assert_eq!(observed, vec![1, 2, 4, 8, 16, 32, 64, 128, 128]);

        backoff.reset();
        assert_eq!(backoff.delay(), RECONNECT_INITIAL);
    }

    #[test]
    fn test_explicit_uris_win() {
        let options = ConnectOptions {
            uris: vec!["ws://one.example:80/mqtt".into()],
            hosts: vec!["ignored.example".into()],
            ports: vec![1883],
            ..Default::default()
        };
        assert_eq!(
            build_uris("ws://base.example:80/mqtt", &options),
            vec!["ws://one.example:80/mqtt"]
        );
    }

    #[test]
    fn test_hosts_and_ports_pair_up() {
        let options = ConnectOptions {
            hosts: vec!["a.example".into(), "::1".into()],
            ports: vec![8080, 8081],
            path: "/ws".into(),
            use_ssl: true,
            ..Default::default()
        };
        assert_eq!(
            build_uris("ws://base.example:80/mqtt", &options),
            vec!["wss://a.example:8080/ws", "wss://[::1]:8081/ws"]
        );
    }

    #[test]
    fn test_base_uri_fallback() {
        let options = ConnectOptions::default();
        assert_eq!(
            build_uris("ws://base.example:80/mqtt", &options),
            vec!["ws://base.example:80/mqtt"]
        );
    }
}

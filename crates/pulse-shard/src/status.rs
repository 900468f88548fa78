//! Per-shard session metadata
//!
//! Tracks the sequence number, session id, resume endpoint and liveness
//! timestamps for one shard, and decides whether a resume is possible.

use pulse_protocol::ReadyPayload;
use std::time::{Duration, Instant};

/// Well-known gateway URL used before a session-specific resume endpoint is
/// negotiated
pub const DEFAULT_GATEWAY: &str = "wss://gateway.discord.gg";

/// Latency above this threshold produces a liveness warning
const LATENCY_WARN_THRESHOLD: Duration = Duration::from_secs(10);

/// Session metadata for one shard
///
/// Created once per shard; persists across reconnect attempts that intend to
/// resume, and is [`reset`](Self::reset) whenever the session is invalidated.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    shard_id: u32,
    sequence: Option<u64>,
    session_id: Option<String>,
    default_endpoint: String,
    resume_endpoint: String,
    latency: Duration,
    last_send: Instant,
    last_recv: Instant,
    last_heartbeat: Option<Instant>,
}

impl ConnectionStatus {
    /// Create status for a shard that has never connected
    #[must_use]
    pub fn new(shard_id: u32) -> Self {
        Self::with_endpoint(shard_id, DEFAULT_GATEWAY)
    }

    /// Create status with a non-default gateway endpoint
    #[must_use]
    pub fn with_endpoint(shard_id: u32, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let now = Instant::now();
        Self {
            shard_id,
            sequence: None,
            session_id: None,
            default_endpoint: endpoint.clone(),
            resume_endpoint: endpoint,
            latency: Duration::MAX,
            last_send: now,
            last_recv: now,
            last_heartbeat: None,
        }
    }

    /// Shard identity
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Last acknowledged event ordinal
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Session id issued by the last successful handshake
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Endpoint for the next connection attempt
    #[must_use]
    pub fn resume_endpoint(&self) -> &str {
        &self.resume_endpoint
    }

    /// Round-trip time of the last acknowledged heartbeat
    ///
    /// `Duration::MAX` until the first acknowledgment arrives.
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Time between the last send and the last receive
    #[must_use]
    pub fn ping(&self) -> Duration {
        self.last_recv.saturating_duration_since(self.last_send)
    }

    /// Clear session state, forcing a fresh identify on the next connect
    pub fn reset(&mut self) {
        self.sequence = None;
        self.session_id = None;
        self.resume_endpoint = self.default_endpoint.clone();
    }

    /// Whether a resume is attemptable
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Record an authoritative inbound sequence number
    ///
    /// Sequence numbers are only ever taken from inbound envelopes, never
    /// guessed locally.
    pub fn update_sequence(&mut self, sequence: u64) {
        self.sequence = Some(sequence);
    }

    /// Capture session id and resume endpoint from a READY dispatch
    pub fn update_ready_data(&mut self, ready: &ReadyPayload) {
        self.session_id = Some(ready.session_id.clone());
        self.resume_endpoint = ready.resume_gateway_url.clone();
    }

    /// Build the connection URL with the protocol's query parameters
    #[must_use]
    pub fn websocket_url(&self, api_version: u8) -> String {
        format!(
            "{}/?v={}&encoding=json&compress=zlib-stream",
            self.resume_endpoint.trim_end_matches('/'),
            api_version
        )
    }

    /// Record an outbound send
    pub fn update_send(&mut self) {
        self.last_send = Instant::now();
    }

    /// Record that a heartbeat payload was sent
    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    /// When the last heartbeat payload was sent
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Record inbound traffic
    pub fn tick(&mut self) {
        self.last_recv = Instant::now();
    }

    /// Acknowledge the in-flight heartbeat and record latency
    ///
    /// `ignore_warning` suppresses the slow-ack warning before the shard is
    /// ready, where ack timing is not meaningful yet.
    pub fn ack(&mut self, ignore_warning: bool) -> Duration {
        self.latency = self.last_send.elapsed();

        if self.latency > LATENCY_WARN_THRESHOLD && !ignore_warning {
            tracing::warn!(
                shard_id = self.shard_id,
                latency_secs = self.latency.as_secs_f64(),
                "Shard heartbeat ack is running behind"
            );
        }

        self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_status() {
        let status = ConnectionStatus::new(3);
        assert_eq!(status.shard_id(), 3);
        assert_eq!(status.sequence(), None);
        assert_eq!(status.session_id(), None);
        assert_eq!(status.resume_endpoint(), DEFAULT_GATEWAY);
        assert_eq!(status.latency(), Duration::MAX);
        assert!(!status.can_resume());
    }

    #[test]
    fn test_can_resume_iff_session_id() {
        let mut status = ConnectionStatus::new(0);
        assert!(!status.can_resume());

        status.update_ready_data(&ReadyPayload {
            session_id: "abc".to_string(),
            resume_gateway_url: "wss://resume.example".to_string(),
        });
        assert!(status.can_resume());
        assert_eq!(status.session_id(), Some("abc"));
        assert_eq!(status.resume_endpoint(), "wss://resume.example");

        status.reset();
        assert!(!status.can_resume());
        assert_eq!(status.resume_endpoint(), DEFAULT_GATEWAY);
    }

    #[test]
    fn test_sequence_survives_reset_only_when_not_reset() {
        let mut status = ConnectionStatus::new(0);
        status.update_sequence(41);
        assert_eq!(status.sequence(), Some(41));

        status.update_sequence(42);
        assert_eq!(status.sequence(), Some(42));

        status.reset();
        assert_eq!(status.sequence(), None);
    }

    #[test]
    fn test_custom_endpoint_survives_reset() {
        let mut status = ConnectionStatus::with_endpoint(0, "ws://127.0.0.1:9000");
        status.update_ready_data(&ReadyPayload {
            session_id: "abc".to_string(),
            resume_gateway_url: "ws://127.0.0.1:9001".to_string(),
        });
        assert_eq!(status.resume_endpoint(), "ws://127.0.0.1:9001");

        status.reset();
        assert_eq!(status.resume_endpoint(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn test_websocket_url() {
        let status = ConnectionStatus::new(0);
        assert_eq!(
            status.websocket_url(8),
            "wss://gateway.discord.gg/?v=8&encoding=json&compress=zlib-stream"
        );

        let mut resumed = ConnectionStatus::new(0);
        resumed.update_ready_data(&ReadyPayload {
            session_id: "abc".to_string(),
            resume_gateway_url: "wss://resume.example/".to_string(),
        });
        assert_eq!(
            resumed.websocket_url(9),
            "wss://resume.example/?v=9&encoding=json&compress=zlib-stream"
        );
    }

    #[test]
    fn test_ack_records_latency() {
        let mut status = ConnectionStatus::new(0);
        status.update_send();
        let latency = status.ack(true);
        assert!(latency < Duration::from_secs(1));
        assert_eq!(status.latency(), latency);
    }

    #[test]
    fn test_slow_ack_crosses_warning_threshold() {
        let mut status = ConnectionStatus::new(0);
        // Backdate the send so the ack lands well past the threshold
        status.last_send = Instant::now() - (LATENCY_WARN_THRESHOLD + Duration::from_secs(1));

        let latency = status.ack(false);
        assert!(latency > LATENCY_WARN_THRESHOLD);
        assert_eq!(status.latency(), latency);
    }
}

//! Payload definitions
//!
//! Bodies carried in the `d` field of handshake and liveness envelopes.

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to open a brand-new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Intents bitmask (0 when no intents were configured)
    pub intents: u64,

    /// Client properties
    pub properties: IdentifyProperties,

    /// Request the compressed transport
    pub compress: bool,

    /// Member count above which a guild is considered large
    pub large_threshold: u16,

    /// `[shard_id, shard_count]` when running sharded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// Client connection properties sent with Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,

    /// Library name
    pub browser: String,

    /// Library name (device slot)
    pub device: String,
}

impl IdentifyProperties {
    /// Library identifier used in both the browser and device slots
    pub const LIBRARY: &'static str = "pulse";

    /// Properties for the current platform
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: Self::LIBRARY.to_string(),
            device: Self::LIBRARY.to_string(),
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::current()
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to resume a disconnected session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// The subset of the READY dispatch the shard itself consumes
///
/// Unknown fields are ignored; the full payload is forwarded to the event
/// parsers untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Session identifier issued by the server
    pub session_id: String,

    /// Session-specific endpoint for later resume attempts
    pub resume_gateway_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_properties_current() {
        let props = IdentifyProperties::current();
        assert_eq!(props.os, std::env::consts::OS);
        assert_eq!(props.browser, IdentifyProperties::LIBRARY);
        assert_eq!(props.device, IdentifyProperties::LIBRARY);
    }

    #[test]
    fn test_identify_payload_serialization() {
        let payload = IdentifyPayload {
            token: "token123".to_string(),
            intents: 513,
            properties: IdentifyProperties::current(),
            compress: true,
            large_threshold: 250,
            shard: None,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("token123"));
        assert!(json.contains("513"));
        assert!(json.contains("large_threshold"));
        // Unsharded identify must omit the shard field entirely
        assert!(!json.contains("\"shard\""));
    }

    #[test]
    fn test_identify_payload_sharded() {
        let payload = IdentifyPayload {
            token: "t".to_string(),
            intents: 0,
            properties: IdentifyProperties::current(),
            compress: true,
            large_threshold: 250,
            shard: Some([2, 8]),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"shard\":[2,8]"));
    }

    #[test]
    fn test_resume_payload_serialization() {
        let payload = ResumePayload {
            token: "token123".to_string(),
            session_id: "session456".to_string(),
            seq: 42,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("session456"));
        assert!(json.contains("42"));
    }

    #[test]
    fn test_ready_payload_ignores_unknown_fields() {
        let ready: ReadyPayload = serde_json::from_value(serde_json::json!({
            "v": 8,
            "session_id": "abc",
            "resume_gateway_url": "wss://resume.example",
            "guilds": [],
            "user": {"id": "1"}
        }))
        .unwrap();

        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.resume_gateway_url, "wss://resume.example");
    }

    #[test]
    fn test_hello_payload_deserialization() {
        let hello: HelloPayload =
            serde_json::from_str(r#"{"heartbeat_interval": 41250}"#).unwrap();
        assert_eq!(hello.heartbeat_interval, 41_250);
    }
}

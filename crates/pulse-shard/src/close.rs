//! Close classification
//!
//! Turns a close code and the kill flag into an explicit reconnect decision,
//! so the policy can be tested without any socket I/O.

use pulse_protocol::CloseCode;

/// Close codes after which the session must not be resumed
const DO_NOT_RESUME: [u16; 7] = [1000, 4004, 4010, 4011, 4012, 4013, 4014];

/// What the runtime does after a connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseIntent {
    /// Session state is intact; reconnect and resume
    Resume,
    /// Session state is gone; reconnect with a fresh identify
    FreshIdentify,
    /// Operator shutdown; no reconnect
    Terminal,
}

impl CloseIntent {
    /// Tag forwarded with the `shard_closed` notification
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::FreshIdentify => "reconnect",
            Self::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for CloseIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a connection end
///
/// An explicit kill always wins, even when racing a natural close. The code
/// preferred by the caller is the one set by a controlled `close()`,
/// falling back to whatever the transport reported; `None` (dirty close
/// with no close frame) is recoverable.
#[must_use]
pub fn classify_close(code: Option<u16>, kill_requested: bool) -> CloseIntent {
    if kill_requested {
        return CloseIntent::Terminal;
    }

    match code {
        Some(code) if DO_NOT_RESUME.contains(&code) => CloseIntent::FreshIdentify,
        _ => CloseIntent::Resume,
    }
}

/// Whether a close code was a normal closure (code 1000)
///
/// The server closing normally without a kill request models unilateral
/// load-balancing: it needs a new session, not a resume.
#[must_use]
pub fn was_normal_close(code: Option<u16>) -> bool {
    code == Some(CloseCode::Normal.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_is_terminal() {
        assert_eq!(classify_close(Some(1000), true), CloseIntent::Terminal);
        assert_eq!(classify_close(Some(1006), true), CloseIntent::Terminal);
        assert_eq!(classify_close(None, true), CloseIntent::Terminal);
    }

    #[test]
    fn test_do_not_resume_codes() {
        for code in [1000, 4004, 4010, 4011, 4012, 4013, 4014] {
            assert_eq!(
                classify_close(Some(code), false),
                CloseIntent::FreshIdentify,
                "code {code} must force a fresh identify"
            );
        }
    }

    #[test]
    fn test_recoverable_codes_resume() {
        // Abnormal closure, try-again-later, rate limits, session timeouts
        for code in [1001, 1006, 1013, 4000, 4007, 4008, 4009] {
            assert_eq!(
                classify_close(Some(code), false),
                CloseIntent::Resume,
                "code {code} must resume"
            );
        }

        // No close frame at all (dirty close)
        assert_eq!(classify_close(None, false), CloseIntent::Resume);
    }

    #[test]
    fn test_normal_close_detection() {
        assert!(was_normal_close(Some(1000)));
        assert!(!was_normal_close(Some(1006)));
        assert!(!was_normal_close(None));
    }

    #[test]
    fn test_intent_tags() {
        assert_eq!(CloseIntent::Resume.as_str(), "resume");
        assert_eq!(CloseIntent::FreshIdentify.as_str(), "reconnect");
        assert_eq!(CloseIntent::Terminal.as_str(), "terminal");
    }
}

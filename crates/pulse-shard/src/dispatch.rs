//! Event dispatch plumbing
//!
//! The shard forwards named dispatch events through an explicit event-name
//! to parser mapping populated at startup, then hands the parsed arguments
//! to the surrounding application's dispatch sink. No mapping means the
//! event is dropped silently.

use serde_json::Value;
use std::collections::HashMap;

/// Result of parsing one raw event payload into dispatch arguments
pub type ParseResult = Result<Vec<Value>, Box<dyn std::error::Error + Send + Sync>>;

/// Turns a raw event payload into the arguments of a dispatch notification
pub type EventParser = Box<dyn Fn(Value) -> ParseResult + Send + Sync>;

/// Event-name to parser mapping
///
/// Built once at startup and read-only afterward; a tagged dispatch table
/// rather than runtime reflection.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, EventParser>,
}

impl ParserRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register a parser under an event name (case-insensitive)
    pub fn register<F>(&mut self, event_name: &str, parser: F)
    where
        F: Fn(Value) -> ParseResult + Send + Sync + 'static,
    {
        self.parsers.insert(event_name.to_lowercase(), Box::new(parser));
    }

    /// Builder-style registration
    #[must_use]
    pub fn with_parser<F>(mut self, event_name: &str, parser: F) -> Self
    where
        F: Fn(Value) -> ParseResult + Send + Sync + 'static,
    {
        self.register(event_name, parser);
        self
    }

    /// Look up the parser for a case-folded event name
    #[must_use]
    pub fn resolve(&self, event_name_lowercased: &str) -> Option<&EventParser> {
        self.parsers.get(event_name_lowercased)
    }

    /// Number of registered parsers
    #[must_use]
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Whether no parsers are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("events", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fire-and-forget notification sink owned by the surrounding application
pub trait DispatchSink: Send + Sync {
    /// Deliver a named notification with parsed arguments
    fn notify(&self, event_name: &str, args: &[Value]);

    /// Whether anything is listening for this event name
    ///
    /// Used to decide between dispatching a lifecycle event and falling back
    /// to leveled log output, so failures are never silent.
    fn has_subscribers(&self, event_name: &str) -> bool;
}

/// Sink that subscribes to nothing; lifecycle events fall back to logs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DispatchSink for NullSink {
    fn notify(&self, _event_name: &str, _args: &[Value]) {}

    fn has_subscribers(&self, _event_name: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_resolve() {
        let registry = ParserRegistry::new().with_parser("MESSAGE_CREATE", |data| {
            Ok(vec![data])
        });

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("message_create").is_some());
        assert!(registry.resolve("typing_start").is_none());
    }

    #[test]
    fn test_registry_case_folding() {
        let mut registry = ParserRegistry::new();
        registry.register("Message_Create", |data| Ok(vec![data]));

        // Lookup key is the lowercased event name
        assert!(registry.resolve("message_create").is_some());
        assert!(registry.resolve("MESSAGE_CREATE").is_none());
    }

    #[test]
    fn test_parser_invocation() {
        let registry = ParserRegistry::new().with_parser("ready", |data| {
            let id = data
                .get("session_id")
                .cloned()
                .ok_or("missing session_id")?;
            Ok(vec![id])
        });

        let parser = registry.resolve("ready").unwrap();
        let args = parser(json!({"session_id": "abc"})).unwrap();
        assert_eq!(args, vec![json!("abc")]);

        assert!(parser(json!({})).is_err());
    }

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        assert!(!sink.has_subscribers("shard_ready"));
        sink.notify("shard_ready", &[json!(0)]);
    }
}

//! # pulse-protocol
//!
//! Wire-level definitions for the gateway protocol: op codes, close codes,
//! the JSON envelope, and the payload bodies exchanged during the handshake.
//! This crate performs no I/O.

mod close_codes;
mod envelope;
mod intents;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use envelope::Envelope;
pub use intents::Intents;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};

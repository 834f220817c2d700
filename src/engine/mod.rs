//! Recognition engine abstraction
//!
//! This module presents a stable contract over whatever streaming
//! speech-to-text capability the host supplies:
//! - `RecognitionBackend` / `RecognitionProvider`: the capability seam
//! - `EngineEvent` / `ErrorCode`: the uniform event surface
//! - `EngineAdapter`: instance lifecycle, including full recreation when
//!   the underlying recognizer wedges
//! - `ScriptedProvider`: a replay backend for tests and demos

pub mod adapter;
pub mod backend;
pub mod event;
pub mod scripted;

pub use adapter::EngineAdapter;
pub use backend::{EngineEventSink, RecognitionBackend, RecognitionProvider};
pub use event::{EngineEvent, ErrorCode, Fragment};
pub use scripted::{ScriptStep, ScriptedProvider};

//! Recognition session management
//!
//! This module turns the engine's noisy, restart-prone event stream into
//! a reliable, mode-aware transcript pipeline:
//! - `machine`: pure transition function over the whole session state
//! - `scheduler`: named, cancelable timers feeding the loop
//! - `recovery`: bounded restart-with-backoff ladder
//! - `controller`: the public `SpeechSession` facade and its loop task

pub mod callbacks;
pub mod controller;
pub mod machine;
pub mod recovery;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use callbacks::SessionCallbacks;
pub use controller::SpeechSession;
pub use machine::{CallbackEvent, Effect, Event};
pub use recovery::{RecoveryDecision, RecoveryLadder};
pub use scheduler::{TimerFired, TimerId, TimerWheel};
pub use state::{Phase, SessionState, Status};
pub use stats::SessionStats;

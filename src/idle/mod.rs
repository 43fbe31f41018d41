//! Idle-reply and scheduled-message engine.
//!
//! [`candidate`] decides what fires next, [`bridge`] keeps the single armed
//! timer on a substrate, [`monitor`] watches the transcript for replies and
//! [`engine`] ties them together on the host loop.

pub mod bridge;
pub mod candidate;
pub mod dispatch;
pub mod engine;
pub mod monitor;
pub mod settings;

pub use bridge::{FiredTimer, SubstrateStatus, TimerRequest, TimerSubstrate};
pub use candidate::Candidate;
pub use dispatch::{HostContext, Outgoing};
pub use engine::{FireOutcome, IdleEngine};
pub use monitor::{Author, Authored, ReplyMonitor};
pub use settings::{ScheduleDaily, ScheduleOnce, SendAs, Settings, SettingsStore};

//! Backup orchestration: what gets exported, under which keys, in which order

mod artifacts;
mod orchestrator;

pub use artifacts::{CHANNELS_KEY, USERS_KEY, channel_key, notification_text};
pub use orchestrator::{BackupOrchestrator, DEFAULT_CHANNEL_DELAY, RunState, RunSummary};

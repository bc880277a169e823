//! `feedlog` - A shared household pet feeding log
//!
//! Everyone in the household records "I fed the pet" from their own device.
//! Records land in one shared zone of the household database, and each
//! device shows the five most recent feedings from anyone.
//!
//! The layers, from the bottom up:
//! - [`backend`]: the [`CloudBackend`] seam and its `SQLite` implementation
//! - [`gateway`]: account check, zone and share provisioning, record I/O
//! - [`history`]: the capped, observable view of recent feedings
//! - [`preferences`]: who is using this device and which pet they feed

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod preferences;
pub mod record;
pub mod storage;

pub use app::App;
pub use backend::{AccountStatus, CloudBackend, InvitationHandle, SqliteCloud, ZoneHandle};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{DeleteSummary, Diagnostics, SyncGateway};
pub use history::{HistoryManager, InitReport, Phase, RefreshHandle, HISTORY_LIMIT};
pub use logging::init_logging;
pub use preferences::{PreferenceStore, Preferences};
pub use record::FeedingRecord;

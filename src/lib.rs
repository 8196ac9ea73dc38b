//! circadian-sync: upload date-partitioned data over SSH
//!
//! Data produced one file or directory per calendar day is uploaded once the
//! day is over (plus a grace period), verified by checksum and optionally
//! removed locally. Lock markers on both hosts keep concurrent writers out of
//! a day while it is being copied.

pub mod callbacks;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod eligibility;
pub mod error;
pub mod lock;
pub mod pattern;
pub mod progress;
pub mod sync;
pub mod transport;

pub use callbacks::UploadCallbacks;
pub use discovery::{discover, DatedUnit, UnitPayload, UnitVariant};
pub use eligibility::is_eligible;
pub use error::{Result, SyncError};
pub use lock::LOCK_MARKER_NAME;
pub use pattern::DatedPattern;
pub use sync::{BatchReport, DailyTransferClient, TransferOptions, UnitOutcome, UnitSummary};
pub use transport::{LocalTransport, Transport};

//! Data models for catalog entities.
//!
//! - `AppEntry`: one application, parsed from either upstream shape
//! - `SourceKind`: which shape produced a record
//! - `RankEntry`: one position in a ranked list

pub mod app_entry;
pub mod rank;

pub use app_entry::{AppEntry, SourceKind};
pub use rank::RankEntry;

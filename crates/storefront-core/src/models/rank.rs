use serde::{Deserialize, Serialize};

/// One slot in a ranked list. `position` is 0-based and unique per list;
/// `app_id` points at an `AppEntry` but does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub position: usize,
    pub app_id: String,
}

impl RankEntry {
    pub fn new(position: usize, app_id: impl Into<String>) -> Self {
        Self {
            position,
            app_id: app_id.into(),
        }
    }

    /// 1-based rank for display.
    pub fn display_rank(&self) -> usize {
        self.position + 1
    }
}

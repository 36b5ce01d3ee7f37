//! The unified catalog application record.
//!
//! The catalog answers in two shapes: ranked feeds (`feed.entry[]`, every
//! value wrapped in `label`/`attributes` objects) and the batch lookup
//! endpoint (`results[]`, flat fields). Both are parsed into `AppEntry`, with
//! `source` recording which shape produced the record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which upstream shape a record was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Unknown,
    FeedEntry,
    LookupResult,
}

impl SourceKind {
    /// Lookup results carry the full record; feed entries only a subset.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SourceKind::LookupResult)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub source: SourceKind,
    /// Catalog track id, not the bundle identifier.
    pub app_id: String,
    pub title: Option<String>,
    pub icon_url: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub rating_count: u64,
}

impl AppEntry {
    /// Build an empty record for the given source and id.
    pub fn new(source: SourceKind, app_id: impl Into<String>) -> Self {
        Self {
            source,
            app_id: app_id.into(),
            title: None,
            icon_url: None,
            summary: None,
            category: None,
            rating: 0.0,
            rating_count: 0,
        }
    }

    /// Parse one raw upstream record.
    ///
    /// Returns `None` for `SourceKind::Unknown`, for values that are not JSON
    /// objects, and for records with no extractable app id. Any other missing
    /// or malformed field just leaves the attribute unset.
    pub fn parse(raw: &Value, source: SourceKind) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }
        match source {
            SourceKind::FeedEntry => Self::parse_feed_entry(raw),
            SourceKind::LookupResult => Self::parse_lookup_result(raw),
            SourceKind::Unknown => None,
        }
    }

    fn parse_feed_entry(raw: &Value) -> Option<Self> {
        let app_id = string_at(raw, "/id/attributes/im:id")?;

        let mut entry = Self::new(SourceKind::FeedEntry, app_id);
        entry.title = string_at(raw, "/im:name/label");
        entry.summary = string_at(raw, "/summary/label");
        entry.category = string_at(raw, "/category/attributes/label");
        entry.icon_url = raw
            .get("im:image")
            .and_then(Value::as_array)
            .and_then(|images| largest_image(images));
        Some(entry)
    }

    fn parse_lookup_result(raw: &Value) -> Option<Self> {
        let app_id = match raw.get("trackId")? {
            Value::Number(n) => n.as_u64().map(|id| id.to_string())?,
            Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => s.clone(),
            _ => return None,
        };

        let mut entry = Self::new(SourceKind::LookupResult, app_id);
        entry.title = string_at(raw, "/trackName");
        entry.summary = string_at(raw, "/description");
        entry.category = string_at(raw, "/genres/0");
        // 100px artwork on purpose; the 512px variant is too heavy for list cells
        entry.icon_url = string_at(raw, "/artworkUrl100");
        entry.rating = raw
            .get("averageUserRating")
            .and_then(Value::as_f64)
            .unwrap_or_default();
        entry.rating_count = raw
            .get("userRatingCount")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        Some(entry)
    }

    /// Display title, falling back to the app id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.app_id)
    }
}

fn string_at(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pick the `label` of the image with the largest declared height.
/// Ties keep the first one seen.
fn largest_image(images: &[Value]) -> Option<String> {
    let mut best: Option<(u64, &Value)> = None;
    for image in images {
        let Some(height) = image.pointer("/attributes/height").and_then(parse_height) else {
            continue;
        };
        if height == 0 {
            continue;
        }
        if best.map_or(true, |(max, _)| height > max) {
            best = Some((height, image));
        }
    }
    best.and_then(|(_, image)| image.get("label").and_then(Value::as_str).map(str::to_string))
}

fn parse_height(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

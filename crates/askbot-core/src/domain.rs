use std::collections::VecDeque;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Chat-platform user id (numeric, opaque to this crate).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UserId(pub i64);

/// One completed question/answer exchange.
///
/// Both text fields are truncated to configured maxima before they reach the
/// record, so a single interaction has bounded size on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// RFC3339 timestamp of the moment the request was accepted.
    pub timestamp: String,
    pub prompt: String,
    pub response_summary: String,
}

/// Durable per-user state: the daily counter and the rolling history.
///
/// Mutated only through the activity service; the history is stored oldest
/// first and evicted FIFO when it exceeds the configured capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    /// Calendar date (policy timezone) that `request_count` applies to.
    #[serde(with = "date_format")]
    pub count_date: NaiveDate,
    pub request_count: u32,
    /// Never reset; counts every accepted request over the user's lifetime.
    pub total_requests_lifetime: u64,
    #[serde(default)]
    pub history: VecDeque<Interaction>,
}

impl UserRecord {
    pub fn new(user_id: UserId, today: NaiveDate) -> Self {
        Self {
            user_id,
            count_date: today,
            request_count: 0,
            total_requests_lifetime: 0,
            history: VecDeque::new(),
        }
    }
}

/// Dates persist as `YYYY-MM-DD` (same shape the original data files used).
/// Hand-rolled because the workspace pins chrono without its serde feature.
mod date_format {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(de)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Truncate on a char boundary, the storage bound for prompts and summaries.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    s.chars().take(max_len).collect()
}

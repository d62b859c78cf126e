use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newly observed message row, with store timestamps decoded.
///
/// Absent timestamps (a raw value of zero in the store) are `None`, never the
/// store's epoch instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub guid: String,
    pub text: Option<String>,
    pub handle: Option<String>,
    /// Group conversation label, when the message belongs to a named chat.
    pub group: Option<String>,
    pub from_me: bool,
    pub date: Option<DateTime<Utc>>,
    pub date_read: Option<DateTime<Utc>>,
}

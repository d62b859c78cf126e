/// One row of the `message` table joined with its sender handle.
///
/// Timestamps are raw store values: seconds (or nanoseconds on newer hosts)
/// since 2001-01-01 UTC, with zero meaning absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub guid: String,
    pub handle: Option<String>,
    pub text: Option<String>,
    pub date: i64,
    pub date_read: i64,
    pub is_from_me: bool,
    pub cache_roomnames: Option<String>,
}

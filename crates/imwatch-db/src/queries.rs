use crate::QueryError;
use crate::models::MessageRow;
use rusqlite::Connection;

const CHANGE_SQL: &str = "SELECT
        guid,
        handle.id,
        text,
        date,
        date_read,
        is_from_me,
        cache_roomnames
    FROM message
    LEFT OUTER JOIN handle ON message.handle_id = handle.ROWID
    WHERE date >= ?1";

/// Selects every message at or after a watermark.
///
/// The range has no upper bound: each poll re-reads everything from the
/// watermark forward and relies on the caller to drop rows it already saw.
/// The watermark must use the same packing as the stored `date` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeQuery {
    since: i64,
}

impl ChangeQuery {
    pub fn since(watermark: i64) -> Self {
        Self { since: watermark }
    }

    pub fn watermark(&self) -> i64 {
        self.since
    }

    pub fn run(&self, conn: &Connection) -> Result<Vec<MessageRow>, QueryError> {
        let mut stmt = conn.prepare_cached(CHANGE_SQL)?;

        let rows = stmt
            .query_map([self.since], |row| {
                Ok(MessageRow {
                    guid: row.get(0)?,
                    handle: row.get(1)?,
                    text: row.get(2)?,
                    date: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    date_read: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                    is_from_me: row.get::<_, Option<bool>>(5)?.unwrap_or(false),
                    cache_roomnames: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

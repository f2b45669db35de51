//! Cursor advancement over a page of log entries

use crate::api::LogEntry;

/// Entries from one poll that have not been delivered before
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NewEntries {
    pub entries: Vec<LogEntry>,
    /// Highest revision seen, if it is newer than the previous cursor
    pub latest_rev: Option<String>,
}

/// Select the entries newer than `cursor`, preserving server order.
///
/// Revisions compare lexicographically. Entries without a usable revision
/// never move the cursor; they ride along only when the page carries at
/// least one new revision, so a repeated page delivers nothing.
pub fn select_new_entries(cursor: Option<&str>, page: Vec<LogEntry>) -> NewEntries {
    let mut latest: Option<String> = None;
    let mut has_new = false;
    let mut entries = Vec::with_capacity(page.len());

    for entry in page {
        match entry.rev() {
            Some(rev) if cursor.map_or(true, |c| rev > c) => {
                has_new = true;
                if latest.as_deref().map_or(true, |l| rev > l) {
                    latest = Some(rev.to_string());
                }
                entries.push(entry);
            }
            Some(_) => {}
            None => entries.push(entry),
        }
    }

    if !has_new {
        entries.clear();
    }

    NewEntries {
        entries,
        latest_rev: latest,
    }
}

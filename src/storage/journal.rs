//! Queue substrate: an append-only newline-delimited JSON journal plus an
//! in-memory index keyed by record id, plus a remembered byte offset for
//! tailing records appended by out-of-process writers.
//!
//! Idempotency: a record id already present in the index is never
//! re-indexed, so a given id is dispatched at most once per process
//! lifetime no matter how many times it appears on disk.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{CortexError, CortexResult};

/// A record that can live in a journal-backed queue.
pub trait QueueRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn record_id(&self) -> &str;
    fn is_pending(&self) -> bool;
    /// Newly discovered records enter the index as pending.
    fn mark_pending(&mut self);
}

impl QueueRecord for crate::item::InboxItem {
    fn record_id(&self) -> &str {
        &self.id
    }
    fn is_pending(&self) -> bool {
        self.status == crate::item::ItemStatus::Pending
    }
    fn mark_pending(&mut self) {
        self.status = crate::item::ItemStatus::Pending;
    }
}

impl QueueRecord for crate::item::Action {
    fn record_id(&self) -> &str {
        &self.id
    }
    fn is_pending(&self) -> bool {
        self.status == crate::item::ActionStatus::Pending
    }
    fn mark_pending(&mut self) {
        self.status = crate::item::ActionStatus::Pending;
    }
}

struct JournalState<T> {
    index: HashMap<String, T>,
    /// Byte position in the journal file up to which records have been
    /// consumed. Never points into the middle of a record.
    offset: u64,
}

pub struct Journal<T: QueueRecord> {
    journal_path: PathBuf,
    snapshot_path: PathBuf,
    snapshot_key: &'static str,
    /// Upper bound on the pending backlog. Records arriving while the
    /// backlog is full are dropped with a warning, so a stalled consumer
    /// cannot grow the queue without limit.
    pending_cap: Option<usize>,
    inner: RwLock<JournalState<T>>,
}

impl<T: QueueRecord> Journal<T> {
    pub fn new(journal_path: PathBuf, snapshot_path: PathBuf, snapshot_key: &'static str) -> Self {
        Self {
            journal_path,
            snapshot_path,
            snapshot_key,
            pending_cap: None,
            inner: RwLock::new(JournalState { index: HashMap::new(), offset: 0 }),
        }
    }

    pub fn with_pending_cap(mut self, cap: usize) -> Self {
        self.pending_cap = Some(cap);
        self
    }

    fn backlog_full(&self, state: &JournalState<T>) -> bool {
        match self.pending_cap {
            Some(cap) => state.index.values().filter(|i| i.is_pending()).count() >= cap,
            None => false,
        }
    }

    /// Index a record, marking it pending. Idempotent on id: a duplicate
    /// is a no-op and returns false. Returns false as well when the
    /// pending backlog is at its cap.
    pub fn add(&self, mut item: T) -> bool {
        let mut state = self.inner.write().expect("journal lock poisoned");
        if state.index.contains_key(item.record_id()) {
            return false;
        }
        if self.backlog_full(&state) {
            tracing::warn!(id = %item.record_id(), "Pending backlog full, record dropped");
            return false;
        }
        item.mark_pending();
        state.index.insert(item.record_id().to_string(), item);
        true
    }

    /// `add` followed by a durable append to the journal. Used by
    /// in-process producers; the fsync makes the record visible to
    /// out-of-process tailers before the call returns.
    pub fn append(&self, mut item: T) -> CortexResult<bool> {
        let mut state = self.inner.write().expect("journal lock poisoned");
        if state.index.contains_key(item.record_id()) {
            return Ok(false);
        }
        if self.backlog_full(&state) {
            tracing::warn!(id = %item.record_id(), "Pending backlog full, record dropped");
            return Ok(false);
        }
        item.mark_pending();
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;
        file.write_all(&line)?;
        file.sync_all()?;

        state.index.insert(item.record_id().to_string(), item);
        Ok(true)
    }

    /// Tail the journal from the remembered offset. Newly seen ids are
    /// indexed as pending and returned; ids already indexed are skipped.
    /// Malformed lines are skipped; a partial last line is left for a
    /// later poll (the offset stops before it).
    pub fn poll(&self) -> CortexResult<Vec<T>> {
        let mut state = self.inner.write().expect("journal lock poisoned");

        if !self.journal_path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&self.journal_path)?;
        file.seek(SeekFrom::Start(state.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        // Only consume through the last complete record.
        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];

        let mut discovered = Vec::new();
        let mut backlog = match self.pending_cap {
            Some(_) => state.index.values().filter(|i| i.is_pending()).count(),
            None => 0,
        };
        for line in complete.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<T>(line) {
                Ok(mut item) => {
                    if state.index.contains_key(item.record_id()) {
                        continue;
                    }
                    if self.pending_cap.is_some_and(|cap| backlog >= cap) {
                        tracing::warn!(id = %item.record_id(), "Pending backlog full, tailed record dropped");
                        continue;
                    }
                    item.mark_pending();
                    state
                        .index
                        .insert(item.record_id().to_string(), item.clone());
                    discovered.push(item);
                    backlog += 1;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed journal line");
                }
            }
        }

        state.offset += (last_newline + 1) as u64;
        Ok(discovered)
    }

    /// Snapshot of pending records. Iteration order unspecified.
    pub fn pending(&self) -> Vec<T> {
        let state = self.inner.read().expect("journal lock poisoned");
        state.index.values().filter(|i| i.is_pending()).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        let state = self.inner.read().expect("journal lock poisoned");
        state.index.get(id).cloned()
    }

    /// Apply a mutation to an indexed record. Returns false for an
    /// unknown id.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        let mut state = self.inner.write().expect("journal lock poisoned");
        match state.index.get_mut(id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("journal lock poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        let state = self.inner.read().expect("journal lock poisoned");
        state.index.values().filter(|i| i.is_pending()).count()
    }

    /// Snapshot the index to disk (single-key JSON object).
    pub fn save(&self) -> CortexResult<()> {
        let state = self.inner.read().expect("journal lock poisoned");
        let items: Vec<&T> = state.index.values().collect();
        let mut doc = serde_json::Map::new();
        doc.insert(self.snapshot_key.to_string(), serde_json::to_value(&items)?);
        let doc = serde_json::Value::Object(doc);
        write_atomic(&self.snapshot_path, &serde_json::to_vec_pretty(&doc)?)?;
        tracing::debug!(count = items.len(), path = %self.snapshot_path.display(), "Queue snapshot saved");
        Ok(())
    }

    /// Rebuild the index from the snapshot (if any) and set the tail
    /// offset to end-of-file so subsequent polls only see new writes.
    pub fn load(&self) -> CortexResult<()> {
        let mut state = self.inner.write().expect("journal lock poisoned");

        if self.snapshot_path.exists() {
            let raw = std::fs::read(&self.snapshot_path)?;
            let doc: serde_json::Value = serde_json::from_slice(&raw)?;
            let items = doc
                .get(self.snapshot_key)
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    CortexError::Storage(format!(
                        "snapshot {} missing key '{}'",
                        self.snapshot_path.display(),
                        self.snapshot_key
                    ))
                })?;
            state.index.clear();
            for value in items {
                match serde_json::from_value::<T>(value.clone()) {
                    Ok(item) => {
                        state.index.insert(item.record_id().to_string(), item);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable snapshot record");
                    }
                }
            }
        }

        state.offset = match std::fs::metadata(&self.journal_path) {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        tracing::debug!(
            count = state.index.len(),
            offset = state.offset,
            path = %self.journal_path.display(),
            "Queue loaded"
        );
        Ok(())
    }
}

/// Write via a temp file + rename so a crash never leaves a torn snapshot.
pub(crate) fn write_atomic(path: &PathBuf, bytes: &[u8]) -> CortexResult<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{InboxItem, ItemStatus};

    fn journal_in(dir: &std::path::Path) -> Journal<InboxItem> {
        Journal::new(dir.join("q.ndjson"), dir.join("q_index.json"), "items")
    }

    fn raw_line(id: &str) -> String {
        format!(r#"{{"id":"{}","status":"pending","content":"hello"}}"#, id)
    }

    #[test]
    fn test_add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        assert!(q.add(InboxItem::new_message("m-1", "a")));
        assert!(!q.add(InboxItem::new_message("m-1", "b")));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pending().len(), 1);
    }

    #[test]
    fn test_append_then_poll_does_not_redeliver() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        q.append(InboxItem::new_message("m-1", "a")).unwrap();
        // Our own append is already indexed; tailing must not re-discover it.
        let polled = q.poll().unwrap();
        assert!(polled.is_empty());
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn test_poll_discovers_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        let mut f = std::fs::File::create(dir.path().join("q.ndjson")).unwrap();
        writeln!(f, "{}", raw_line("m-1")).unwrap();
        writeln!(f, "{}", raw_line("m-2")).unwrap();
        let polled = q.poll().unwrap();
        assert_eq!(polled.len(), 2);
        // Second poll: nothing new.
        assert!(q.poll().unwrap().is_empty());
    }

    #[test]
    fn test_poll_dedupes_repeated_ids() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        let mut f = std::fs::File::create(dir.path().join("q.ndjson")).unwrap();
        for _ in 0..3 {
            writeln!(f, "{}", raw_line("m-1")).unwrap();
        }
        let polled = q.poll().unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(q.pending().len(), 1);
    }

    #[test]
    fn test_poll_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        let mut f = std::fs::File::create(dir.path().join("q.ndjson")).unwrap();
        writeln!(f, "{}", raw_line("m-1")).unwrap();
        writeln!(f, "this is not json").unwrap();
        writeln!(f, "{}", raw_line("m-2")).unwrap();
        let polled = q.poll().unwrap();
        assert_eq!(polled.len(), 2);
    }

    #[test]
    fn test_partial_last_line_not_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        let path = dir.path().join("q.ndjson");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", raw_line("m-1")).unwrap();
        // Torn write: record without trailing newline.
        write!(f, r#"{{"id":"m-2","status":"pending","#).unwrap();
        f.flush().unwrap();

        assert_eq!(q.poll().unwrap().len(), 1);

        // Writer completes the record later.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, r#""content":"late"}}"#).unwrap();
        let polled = q.poll().unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, "m-2");
        assert_eq!(polled[0].content, "late");
    }

    #[test]
    fn test_empty_poll_does_not_advance_offset() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        assert!(q.poll().unwrap().is_empty());
        assert!(q.poll().unwrap().is_empty());
        let path = dir.path().join("q.ndjson");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", raw_line("m-1")).unwrap();
        assert_eq!(q.poll().unwrap().len(), 1);
    }

    #[test]
    fn test_pending_cap_rejects_new_records() {
        let dir = tempfile::tempdir().unwrap();
        let q = Journal::<InboxItem>::new(
            dir.path().join("q.ndjson"),
            dir.path().join("q_index.json"),
            "items",
        )
        .with_pending_cap(2);

        assert!(q.add(InboxItem::new_message("m-1", "a")));
        assert!(q.add(InboxItem::new_message("m-2", "b")));
        assert!(!q.add(InboxItem::new_message("m-3", "c")));
        assert_eq!(q.pending_count(), 2);

        // Consuming a record frees capacity.
        q.update("m-1", |i| i.status = ItemStatus::Processed);
        assert!(q.add(InboxItem::new_message("m-3", "c")));
    }

    #[test]
    fn test_pending_cap_applies_to_tailed_records() {
        let dir = tempfile::tempdir().unwrap();
        let q = Journal::<InboxItem>::new(
            dir.path().join("q.ndjson"),
            dir.path().join("q_index.json"),
            "items",
        )
        .with_pending_cap(2);

        let mut f = std::fs::File::create(dir.path().join("q.ndjson")).unwrap();
        for i in 0..4 {
            writeln!(f, "{}", raw_line(&format!("m-{}", i))).unwrap();
        }
        let polled = q.poll().unwrap();
        assert_eq!(polled.len(), 2);
        assert_eq!(q.pending_count(), 2);
        // The overflow records were consumed and dropped, not deferred.
        assert!(q.poll().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        q.append(InboxItem::new_message("m-1", "a")).unwrap();
        q.append(InboxItem::new_message("m-2", "b")).unwrap();
        q.update("m-1", |i| i.status = ItemStatus::Processed);
        q.save().unwrap();

        let q2 = journal_in(dir.path());
        q2.load().unwrap();
        assert_eq!(q2.len(), 2);
        assert_eq!(q2.pending_count(), 1);
        assert_eq!(q2.get("m-1").unwrap().status, ItemStatus::Processed);
        // Offset at EOF: the journaled records are not re-discovered.
        assert!(q2.poll().unwrap().is_empty());
    }

    #[test]
    fn test_load_then_poll_sees_only_new_writes() {
        let dir = tempfile::tempdir().unwrap();
        let q = journal_in(dir.path());
        q.append(InboxItem::new_message("m-1", "a")).unwrap();
        q.save().unwrap();

        let q2 = journal_in(dir.path());
        q2.load().unwrap();
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.path().join("q.ndjson"))
            .unwrap();
        writeln!(f, "{}", raw_line("m-9")).unwrap();
        let polled = q2.poll().unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].id, "m-9");
    }
}

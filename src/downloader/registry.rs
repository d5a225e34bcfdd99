// Active downloads table
//
// Every mutation of a record and the event describing it happen under one
// lock, so events for a download leave in mutation order and nothing is sent
// for an id after its `Finished`.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::models::{DownloadEvent, DownloadId, DownloadRecord, DownloadStatus};

pub const STOPPED_MESSAGE: &str = "Download stopped";

pub struct ActiveDownloads {
    records: Mutex<HashMap<DownloadId, DownloadRecord>>,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl ActiveDownloads {
    pub fn new(events: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Track a new record and announce it
    pub fn insert(&self, record: DownloadRecord) {
        let mut records = self.records.lock();
        self.emit(DownloadEvent::Progress(record.clone()));
        records.insert(record.id, record);
    }

    /// Mutate a live record and send the new snapshot.
    ///
    /// Returns false when the record is no longer active.
    pub fn update<F>(&self, id: DownloadId, apply: F) -> bool
    where
        F: FnOnce(&mut DownloadRecord),
    {
        let mut records = self.records.lock();
        match records.get_mut(&id) {
            Some(record) => {
                apply(record);
                self.emit(DownloadEvent::Progress(record.clone()));
                true
            }
            None => false,
        }
    }

    /// Move a record into its terminal state, evict it, then report it.
    ///
    /// Only the first caller for an id gets to report; later calls return false.
    pub fn finish<F>(&self, id: DownloadId, apply: F, success: bool, message: String) -> bool
    where
        F: FnOnce(&mut DownloadRecord),
    {
        let mut records = self.records.lock();
        let Some(mut record) = records.remove(&id) else {
            debug!(download_id = %id.short(), "Already finished, dropping outcome");
            return false;
        };
        apply(&mut record);
        self.emit(DownloadEvent::Progress(record));
        self.emit(DownloadEvent::Finished { id, success, message });
        true
    }

    /// Stop and evict every active record; returns how many were stopped
    pub fn stop_all(&self) -> usize {
        let mut records = self.records.lock();
        let mut stopped: Vec<DownloadRecord> = records.drain().map(|(_, r)| r).collect();
        stopped.sort_by_key(|r| r.id);

        for mut record in stopped.iter().cloned() {
            record.status = DownloadStatus::Stopped;
            let id = record.id;
            self.emit(DownloadEvent::Progress(record));
            self.emit(DownloadEvent::Finished {
                id,
                success: false,
                message: STOPPED_MESSAGE.to_string(),
            });
        }
        stopped.len()
    }

    pub fn get(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.records.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<DownloadId> {
        let mut ids: Vec<DownloadId> = self.records.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn emit(&self, event: DownloadEvent) {
        // Nobody listening is not an error for the download itself
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::DownloadRequest;
    use crate::downloader::services::detect;

    fn record(url: &str) -> DownloadRecord {
        let request = DownloadRequest::audio(url, "/tmp");
        DownloadRecord::new(DownloadId::new(), &request, &detect(url))
    }

    #[test]
    fn test_insert_update_finish() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let active = ActiveDownloads::new(tx);
        let r = record("https://soundcloud.com/a/b");
        let id = r.id;

        active.insert(r);
        assert!(active.update(id, |r| r.progress = 40.0));
        assert!(active.finish(id, |r| r.status = DownloadStatus::Completed, true, String::new()));
        assert!(!active.finish(id, |r| r.status = DownloadStatus::Failed, false, String::new()));
        assert!(!active.update(id, |r| r.progress = 50.0));
        assert!(active.is_empty());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[1], DownloadEvent::Progress(r) if r.progress == 40.0));
        assert!(matches!(events[3], DownloadEvent::Finished { success: true, .. }));
    }

    #[test]
    fn test_stop_all_reports_each_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let active = ActiveDownloads::new(tx);
        active.insert(record("https://youtu.be/a"));
        active.insert(record("https://youtu.be/b"));
        while rx.try_recv().is_ok() {}

        assert_eq!(active.stop_all(), 2);
        assert!(active.is_empty());
        assert_eq!(active.stop_all(), 0);

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                DownloadEvent::Finished { success, message, .. } => {
                    assert!(!success);
                    assert_eq!(message, STOPPED_MESSAGE);
                    finished += 1;
                }
                DownloadEvent::Progress(r) => assert_eq!(r.status, DownloadStatus::Stopped),
            }
        }
        assert_eq!(finished, 2);
    }
}

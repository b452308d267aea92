//! Transaction import
//!
//! Sources (GnuCash XML books, CSV statements) produce batches of
//! [`ImportedTransaction`]s. File imports run on a background thread and
//! report through a channel of [`ImportEvent`]s: a `Started` marker,
//! percentage `Progress` updates, the `Imported` batch on success, and a
//! terminal `Finished` event carrying the overall result. Imports may be
//! cancelled between transactions; a cancelled or failed import never
//! delivers a partial batch.

pub mod csv;
pub mod gnucash;

use chrono::NaiveDate;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

use crate::models::transaction::ImportedTransaction;

pub use self::csv::{ColumnProfile, CsvImporter};
pub use self::gnucash::{GnuCashReader, ReadOutcome};

/// Optional date range restriction for an import.
///
/// The range only applies when both bounds are present, and is inclusive on
/// both ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }
}

/// Terminal state of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    /// All transactions were read
    Complete,
    /// The import was cancelled before completing
    Cancelled,
    /// The import failed; the message describes why
    Failed,
}

/// Notification from a running import
#[derive(Debug)]
pub enum ImportEvent {
    /// The import has begun
    Started,
    /// Percentage of the input consumed so far
    Progress(u8),
    /// The complete batch of imported transactions
    Imported(Vec<ImportedTransaction>),
    /// The import has ended; no further events follow
    Finished(ImportResult, String),
}

/// Handle to a background import
pub struct ImportHandle {
    events: Receiver<ImportEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ImportHandle {
    /// Channel of import events, ending with a `Finished` event
    pub fn events(&self) -> &Receiver<ImportEvent> {
        &self.events
    }

    /// Request cancellation; takes effect between transactions
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Block until the import ends, returning every event it produced
    pub fn wait(mut self) -> Vec<ImportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.recv() {
            let finished = matches!(event, ImportEvent::Finished(..));
            events.push(event);
            if finished {
                break;
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        events
    }
}

impl Drop for ImportHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Import a GnuCash book file on a background thread
pub fn import_gnucash(path: PathBuf, filter: DateFilter) -> ImportHandle {
    spawn_import(path, move |path, cancel, events| {
        run_gnucash(path, filter, cancel, events)
    })
}

/// Import a CSV statement file on a background thread
pub fn import_csv(path: PathBuf, profile: ColumnProfile, filter: DateFilter) -> ImportHandle {
    spawn_import(path, move |path, cancel, events| {
        run_csv(path, profile, filter, cancel, events)
    })
}

fn spawn_import<F>(path: PathBuf, run: F) -> ImportHandle
where
    F: FnOnce(&Path, &AtomicBool, &Sender<ImportEvent>) + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let flag = Arc::clone(&cancel);
    let thread = thread::spawn(move || {
        let _ = tx.send(ImportEvent::Started);
        run(&path, &flag, &tx);
    });
    ImportHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}

fn open_input(path: &Path, events: &Sender<ImportEvent>) -> Option<(File, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => {
            let message = if path.exists() {
                format!("File, {}, could not be opened", path.display())
            } else {
                format!("File, {}, does not exist", path.display())
            };
            let _ = events.send(ImportEvent::Finished(ImportResult::Failed, message));
            return None;
        }
    };
    let total = file.metadata().map(|m| m.len()).unwrap_or(0);
    Some((file, total))
}

fn run_gnucash(path: &Path, filter: DateFilter, cancel: &AtomicBool, events: &Sender<ImportEvent>) {
    let (file, total) = match open_input(path, events) {
        Some(input) => input,
        None => return,
    };

    let mut last_percent = 0u8;
    let outcome = GnuCashReader::new(filter).read(BufReader::new(file), cancel, &mut |bytes| {
        let percent = if total == 0 {
            0
        } else {
            ((bytes * 100) / total).min(100) as u8
        };
        if percent != last_percent {
            last_percent = percent;
            let _ = events.send(ImportEvent::Progress(percent));
        }
    });

    match outcome {
        Ok(ReadOutcome::Complete(transactions)) => {
            info!(count = transactions.len(), file = %path.display(), "import complete");
            let _ = events.send(ImportEvent::Imported(transactions));
            let _ = events.send(ImportEvent::Finished(ImportResult::Complete, String::new()));
        }
        Ok(ReadOutcome::Cancelled) => {
            info!(file = %path.display(), "import cancelled");
            let _ = events.send(ImportEvent::Finished(ImportResult::Cancelled, String::new()));
        }
        Err(err) => {
            let _ = events.send(ImportEvent::Finished(ImportResult::Failed, err.to_string()));
        }
    }
}

fn run_csv(
    path: &Path,
    profile: ColumnProfile,
    filter: DateFilter,
    cancel: &AtomicBool,
    events: &Sender<ImportEvent>,
) {
    let (file, _) = match open_input(path, events) {
        Some(input) => input,
        None => return,
    };

    // CSV statements are small; the cancel flag is only honored up front
    if cancel.load(Ordering::Relaxed) {
        let _ = events.send(ImportEvent::Finished(ImportResult::Cancelled, String::new()));
        return;
    }

    match CsvImporter::new(profile, filter).read_all(BufReader::new(file)) {
        Ok(transactions) => {
            info!(count = transactions.len(), file = %path.display(), "import complete");
            let _ = events.send(ImportEvent::Progress(100));
            let _ = events.send(ImportEvent::Imported(transactions));
            let _ = events.send(ImportEvent::Finished(ImportResult::Complete, String::new()));
        }
        Err(err) => {
            let _ = events.send(ImportEvent::Finished(ImportResult::Failed, err.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_fails_with_message() {
        let handle = import_gnucash(PathBuf::from("/no/such/book.gnucash"), DateFilter::default());
        let events = handle.wait();

        assert!(matches!(events.first(), Some(ImportEvent::Started)));
        match events.last() {
            Some(ImportEvent::Finished(ImportResult::Failed, message)) => {
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected terminal event: {:?}", other),
        }
    }

    #[test]
    fn test_csv_worker_delivers_batch_then_finishes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Date,Amount,Description").unwrap();
        writeln!(file, "2013-12-05,-45.00,Grocery Store").unwrap();
        file.flush().unwrap();

        let handle = import_csv(
            file.path().to_path_buf(),
            ColumnProfile::default(),
            DateFilter::default(),
        );
        let events = handle.wait();

        let batch = events.iter().find_map(|e| match e {
            ImportEvent::Imported(transactions) => Some(transactions),
            _ => None,
        });
        assert_eq!(batch.map(Vec::len), Some(1));
        assert!(matches!(
            events.last(),
            Some(ImportEvent::Finished(ImportResult::Complete, _))
        ));
    }

    #[test]
    fn test_gnucash_worker_end_to_end() {
        let xml = r#"<?xml version="1.0"?>
<gnc-v2>
<gnc:book version="2.0.0">
<gnc:account version="2.0.0">
<act:name>Root</act:name><act:id type="guid">r</act:id><act:type>ROOT</act:type>
</gnc:account>
<gnc:account version="2.0.0">
<act:name>Checking</act:name><act:id type="guid">c</act:id><act:type>BANK</act:type>
<act:parent type="guid">r</act:parent>
</gnc:account>
<gnc:account version="2.0.0">
<act:name>Food</act:name><act:id type="guid">f</act:id><act:type>EXPENSE</act:type>
<act:parent type="guid">r</act:parent>
</gnc:account>
<gnc:transaction version="2.0.0">
<trn:date-posted><ts:date>2013-12-05 00:00:00 -0500</ts:date></trn:date-posted>
<trn:description>Grocery Store</trn:description>
<trn:splits>
<trn:split>
<split:id type="guid">s1</split:id>
<split:value>-4500/100</split:value>
<split:account type="guid">c</split:account>
</trn:split>
<trn:split>
<split:id type="guid">s2</split:id>
<split:value>4500/100</split:value>
<split:account type="guid">f</split:account>
</trn:split>
</trn:splits>
</gnc:transaction>
</gnc:book>
</gnc-v2>"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        file.flush().unwrap();

        let handle = import_gnucash(file.path().to_path_buf(), DateFilter::default());
        let events = handle.wait();

        let batch = events.iter().find_map(|e| match e {
            ImportEvent::Imported(transactions) => Some(transactions),
            _ => None,
        });
        let batch = batch.expect("expected an imported batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].withdrawal_account, "Checking");
        assert_eq!(batch[0].deposit_account, "Food");
        assert!(matches!(
            events.last(),
            Some(ImportEvent::Finished(ImportResult::Complete, _))
        ));
    }
}

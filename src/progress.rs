//! Scan progress events and their terminal display.
//!
//! The scanner never waits on whoever watches it. Events go through a bounded
//! [`crossbeam_channel`]; when the buffer is full, or the receiving side is
//! gone, the event is dropped and counted instead of blocking the scan.
//!
//! # Example
//!
//! ```
//! use imgdedup::progress::{ProgressSink, ScanEvent};
//!
//! let (sink, events) = ProgressSink::bounded(1);
//! sink.emit(ScanEvent::Cached { path: "/a.jpg".into() });
//! sink.emit(ScanEvent::Cached { path: "/b.jpg".into() });
//!
//! assert_eq!(events.try_iter().count(), 1);
//! assert_eq!(sink.dropped(), 1);
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};

/// One observable step of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A root directory is about to be walked
    RootStarted { root: PathBuf },
    /// A file's record was still valid and was not re-read
    Cached { path: String },
    /// A file was fingerprinted; `created` is false for a refreshed record
    Hashed { path: String, created: bool },
    /// A file could not be read
    HashFailed { path: PathBuf, message: String },
    /// The walker could not visit an entry
    WalkError { path: PathBuf, message: String },
    /// A record was removed because its file is gone
    Pruned { path: String },
    /// A record could not be written to the index
    WriteFailed { path: String, message: String },
    /// A root directory has been fully processed
    RootFinished { root: PathBuf, files: u64 },
}

/// Producer side of the progress channel.
///
/// Cheap to clone; all clones share one drop counter.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Option<Sender<ScanEvent>>,
    dropped: Arc<AtomicU64>,
}

impl ProgressSink {
    /// A sink backed by a channel holding at most `capacity` undelivered events.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ScanEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let sink = Self {
            sender: Some(sender),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, receiver)
    }

    /// A sink that discards everything without counting.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event without blocking.
    pub fn emit(&self, event: ScanEvent) {
        if let Some(sender) = &self.sender {
            if sender.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events lost to a full or disconnected channel so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Counts of what the display thread actually received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub files: u64,
    pub problems: u64,
}

/// Spinner that follows a scan from the receiving end of a [`ProgressSink`].
pub struct ScanProgress {
    bar: ProgressBar,
    tally: ProgressTally,
}

impl ScanProgress {
    /// Create the spinner. A quiet spinner draws nothing but still tallies.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self {
            bar,
            tally: ProgressTally::default(),
        }
    }

    /// Apply one event to the display.
    pub fn handle(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::RootStarted { root } => {
                self.bar.set_message(format!("Scanning {}", root.display()));
            }
            ScanEvent::Cached { .. } | ScanEvent::Hashed { .. } => {
                self.tally.files += 1;
                self.bar.inc(1);
            }
            ScanEvent::HashFailed { path, message } | ScanEvent::WalkError { path, message } => {
                self.tally.problems += 1;
                self.bar
                    .suspend(|| log::debug!("{}: {}", path.display(), message));
            }
            ScanEvent::WriteFailed { path, message } => {
                self.tally.problems += 1;
                self.bar.suspend(|| log::debug!("{path}: {message}"));
            }
            ScanEvent::Pruned { .. } => {
                self.bar.set_message("Removing vanished files from the index");
            }
            ScanEvent::RootFinished { root, files } => {
                self.bar
                    .set_message(format!("Finished {} ({files} files)", root.display()));
            }
        }
    }

    /// Drain `events` until every sender is gone, then clear the spinner.
    #[must_use]
    pub fn follow(mut self, events: &Receiver<ScanEvent>) -> ProgressTally {
        for event in events {
            self.handle(&event);
        }
        self.bar.finish_and_clear();
        self.tally
    }

    /// Run [`ScanProgress::follow`] on its own thread.
    #[must_use]
    pub fn spawn(self, events: Receiver<ScanEvent>) -> JoinHandle<ProgressTally> {
        std::thread::spawn(move || self.follow(&events))
    }
}

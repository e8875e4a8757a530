use tokio::sync::watch;
use tracing::{debug, warn};

use crate::ingest::preview::{build_preview, Preview};
use crate::ingest::upload::UploadedFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file: UploadedFile,
    pub preview: Preview,
}

/// Snapshot published to subscribers on every selection change. `revision`
/// increases on every publish, including repeats of an identical selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Empty {
        revision: u64,
        rejected: Vec<String>,
    },
    Valid {
        revision: u64,
        entries: Vec<SelectedFile>,
        rejected: Vec<String>,
    },
}

impl Selection {
    pub fn revision(&self) -> u64 {
        match self {
            Self::Empty { revision, .. } | Self::Valid { revision, .. } => *revision,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }

    pub fn entries(&self) -> &[SelectedFile] {
        match self {
            Self::Empty { .. } => &[],
            Self::Valid { entries, .. } => entries.as_slice(),
        }
    }

    pub fn files(&self) -> Vec<UploadedFile> {
        self.entries().iter().map(|e| e.file.clone()).collect()
    }

    pub fn rejected(&self) -> &[String] {
        match self {
            Self::Empty { rejected, .. } | Self::Valid { rejected, .. } => rejected.as_slice(),
        }
    }
}

#[derive(Debug)]
pub struct SelectionManager {
    tx: watch::Sender<Selection>,
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionManager {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(Selection::Empty {
                revision: 0,
                rejected: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Selection {
        self.tx.borrow().clone()
    }

    pub fn files(&self) -> Vec<UploadedFile> {
        self.tx.borrow().files()
    }

    pub fn select_files(&self, raw: Vec<UploadedFile>) -> Selection {
        let total = raw.len();
        let (accepted, rejected): (Vec<_>, Vec<_>) =
            raw.into_iter().partition(UploadedFile::is_accepted);
        let rejected = rejected
            .into_iter()
            .map(|f| f.name().to_string())
            .collect::<Vec<_>>();

        if !rejected.is_empty() {
            warn!(
                rejected = rejected.len(),
                total,
                files = ?rejected,
                "some files were of an unsupported type and were ignored"
            );
        }

        if accepted.is_empty() {
            return self.publish(|revision| Selection::Empty { revision, rejected });
        }

        let entries = accepted
            .into_iter()
            .map(|file| SelectedFile {
                preview: build_preview(&file),
                file,
            })
            .collect::<Vec<_>>();
        self.publish(|revision| Selection::Valid {
            revision,
            entries,
            rejected,
        })
    }

    /// Drops files and previews. The revision still moves forward so a
    /// later selection of the same file is observed as a change.
    pub fn clear(&self) -> Selection {
        self.publish(|revision| Selection::Empty {
            revision,
            rejected: Vec::new(),
        })
    }

    fn publish(&self, build: impl FnOnce(u64) -> Selection) -> Selection {
        let mut published = None;
        self.tx.send_modify(|current| {
            let next = build(current.revision() + 1);
            published = Some(next.clone());
            *current = next;
        });
        let selection = published.unwrap_or_else(|| self.current());
        debug!(
            revision = selection.revision(),
            files = selection.entries().len(),
            "selection published"
        );
        selection
    }
}

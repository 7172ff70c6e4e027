//! Batch text modification with single-level undo.
//!
//! A modification is applied to each file in turn on the caller's (background)
//! thread. Progress and per-file failures go out as [`ProgressMessage`]s; the
//! original bytes of every rewritten file are collected into an
//! [`UndoSnapshot`] which is sent just before `Completed`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::file_ops::{display_name, ProgressMessage, CHUNK_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ModifyError {
    #[error("Find text cannot be empty")]
    EmptyPattern,

    #[error("Not a regular file")]
    NotAFile,

    #[error("File is not valid UTF-8 text")]
    NotText,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A transformation of a text file's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Replace every literal occurrence of `find`
    FindReplace { find: String, replace: String },
    Append(String),
    Prepend(String),
    /// Replace the whole content (editor save)
    Overwrite(String),
}

impl Modification {
    pub fn find_and_replace(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Modification::FindReplace {
            find: find.into(),
            replace: replace.into(),
        }
    }

    pub fn append_text(text: impl Into<String>) -> Self {
        Modification::Append(text.into())
    }

    pub fn prepend_text(text: impl Into<String>) -> Self {
        Modification::Prepend(text.into())
    }

    /// Name shown in progress and completion messages
    pub fn label(&self) -> &'static str {
        match self {
            Modification::FindReplace { .. } => "Finding and replacing text",
            Modification::Append(_) => "Appending text",
            Modification::Prepend(_) => "Prepending text",
            Modification::Overwrite(_) => "Saving file",
        }
    }

    pub fn validate(&self) -> Result<(), ModifyError> {
        match self {
            Modification::FindReplace { find, .. } if find.is_empty() => {
                Err(ModifyError::EmptyPattern)
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, content: &str) -> Result<String, ModifyError> {
        self.validate()?;
        Ok(match self {
            Modification::FindReplace { find, replace } => content.replace(find.as_str(), replace),
            Modification::Append(text) => format!("{}{}", content, text),
            Modification::Prepend(text) => format!("{}{}", text, content),
            Modification::Overwrite(new_content) => new_content.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub path: PathBuf,
    pub original: Vec<u8>,
}

/// Original contents of the files touched by the last modification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoSnapshot {
    pub label: String,
    pub entries: Vec<UndoEntry>,
}

impl UndoSnapshot {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Overwrite the existing file at `path` in chunks, reporting each chunk.
/// A missing file is an error; nothing is created.
fn write_with_progress(
    path: &Path,
    bytes: &[u8],
    on_chunk: &mut dyn FnMut(u64, u64),
) -> io::Result<()> {
    let total = bytes.len() as u64;
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    let mut written = 0u64;

    if bytes.is_empty() {
        on_chunk(0, 0);
    }
    for chunk in bytes.chunks(CHUNK_SIZE) {
        file.write_all(chunk)?;
        written += chunk.len() as u64;
        on_chunk(written, total);
    }
    file.flush()?;
    file.sync_all()
}

/// Apply `modification` to one file.
/// Returns the original bytes when the file was rewritten, `None` when unchanged.
fn modify_one(
    path: &Path,
    modification: &Modification,
    on_chunk: &mut dyn FnMut(u64, u64),
) -> Result<Option<Vec<u8>>, ModifyError> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(ModifyError::NotAFile);
    }

    let original = fs::read(path)?;
    let updated = match modification {
        Modification::Overwrite(content) => content.clone(),
        _ => {
            let text = std::str::from_utf8(&original).map_err(|_| ModifyError::NotText)?;
            modification.apply(text)?
        }
    };

    if updated.as_bytes() == original.as_slice() {
        return Ok(None);
    }

    if let Err(e) = write_with_progress(path, updated.as_bytes(), on_chunk) {
        // Put the original back so a failed write never leaves a truncated file
        if let Err(restore_err) = fs::write(path, &original) {
            log::error!(
                "Could not restore {} after failed write: {}",
                path.display(),
                restore_err
            );
        }
        return Err(e.into());
    }

    Ok(Some(original))
}

/// Apply `modification` to every file in `files`, in order
pub fn modify_files(
    files: Vec<PathBuf>,
    modification: Modification,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    run_modification(&files, &modification, &cancel_flag, &mut |msg| {
        let _ = tx.send(msg);
    });
}

/// The modification loop. A cancel stops before the next file; files already
/// rewritten are still reported in `Modified` so they stay undoable.
fn run_modification(
    files: &[PathBuf],
    modification: &Modification,
    cancel_flag: &AtomicBool,
    emit: &mut dyn FnMut(ProgressMessage),
) {
    let total = files.len();
    let mut snapshot = UndoSnapshot::new(modification.label());
    let mut success = 0;
    let mut failure = 0;

    log::info!("{}: {} file(s)", modification.label(), total);

    for (index, path) in files.iter().enumerate() {
        if cancel_flag.load(Ordering::Relaxed) {
            log::info!("{} cancelled after {} of {} file(s)", modification.label(), index, total);
            break;
        }

        let name = display_name(path);
        emit(ProgressMessage::FileStarted(name.clone()));
        emit(ProgressMessage::TotalProgress(index, total, 0, 0));

        let mut on_chunk = |written: u64, file_total: u64| {
            emit(ProgressMessage::FileProgress(written, file_total));
        };
        let outcome = modify_one(path, modification, &mut on_chunk);

        match outcome {
            Ok(original) => {
                success += 1;
                if let Some(original) = original {
                    snapshot.entries.push(UndoEntry {
                        path: path.clone(),
                        original,
                    });
                } else {
                    log::debug!("{} unchanged", path.display());
                }
                emit(ProgressMessage::FileCompleted(name));
            }
            Err(e) => {
                failure += 1;
                log::warn!("Error modifying {}: {}", path.display(), e);
                emit(ProgressMessage::Error(name, e.to_string()));
            }
        }

        emit(ProgressMessage::TotalProgress(index + 1, total, 0, 0));
    }

    log::info!(
        "{} finished: {} succeeded, {} failed, {} rewritten",
        modification.label(),
        success,
        failure,
        snapshot.len()
    );

    if !snapshot.is_empty() {
        emit(ProgressMessage::Modified(snapshot));
    }
    emit(ProgressMessage::Completed(success, failure));
}

/// Replace the content of a single file (editor save)
pub fn modify_file(
    path: PathBuf,
    content: String,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    modify_files(vec![path], Modification::Overwrite(content), cancel_flag, tx);
}

/// Restore every file in `snapshot` to its recorded content
pub fn undo(snapshot: UndoSnapshot, cancel_flag: Arc<AtomicBool>, tx: Sender<ProgressMessage>) {
    let total = snapshot.len();
    let mut success = 0;
    let mut failure = 0;

    log::info!("Undoing \"{}\": {} file(s)", snapshot.label, total);

    for (index, entry) in snapshot.entries.iter().enumerate() {
        if cancel_flag.load(Ordering::Relaxed) {
            log::info!("Undo cancelled after {} of {} file(s)", index, total);
            break;
        }

        let name = display_name(&entry.path);
        let _ = tx.send(ProgressMessage::FileStarted(name.clone()));
        let _ = tx.send(ProgressMessage::TotalProgress(index, total, 0, 0));

        let mut on_chunk = |written: u64, file_total: u64| {
            let _ = tx.send(ProgressMessage::FileProgress(written, file_total));
        };

        match write_with_progress(&entry.path, &entry.original, &mut on_chunk) {
            Ok(()) => {
                success += 1;
                let _ = tx.send(ProgressMessage::FileCompleted(name));
            }
            Err(e) => {
                failure += 1;
                log::warn!("Undo of {} failed: {}", entry.path.display(), e);
                let _ = tx.send(ProgressMessage::Error(name, e.to_string()));
            }
        }

        let _ = tx.send(ProgressMessage::TotalProgress(index + 1, total, 0, 0));
    }

    log::info!("Undo finished: {} restored, {} failed", success, failure);
    let _ = tx.send(ProgressMessage::Completed(success, failure));
}

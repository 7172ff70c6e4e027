use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::modifier::UndoSnapshot;

/// Chunk size for copies and writes that report byte progress
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Maximum recursion depth for directory copy to prevent stack overflow
const MAX_COPY_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperationType {
    Delete,
    Copy,
    Move,
    Modify,
    Save,
    Undo,
}

impl FileOperationType {
    pub fn verb(&self) -> &'static str {
        match self {
            FileOperationType::Delete => "deleting",
            FileOperationType::Copy => "copying",
            FileOperationType::Move => "moving",
            FileOperationType::Modify => "modifying",
            FileOperationType::Save => "saving",
            FileOperationType::Undo => "restoring",
        }
    }
}

/// Messages sent from a background operation to the UI
#[derive(Debug)]
pub enum ProgressMessage {
    FileStarted(String),
    /// Bytes done / bytes total for the current item
    FileProgress(u64, u64),
    FileCompleted(String),
    /// (completed files, total files, completed bytes, total bytes)
    TotalProgress(usize, usize, u64, u64),
    /// (file name, error message)
    Error(String, String),
    /// Original contents of every file the operation rewrote
    Modified(UndoSnapshot),
    /// (success count, failure count)
    Completed(usize, usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOperationResult {
    pub success_count: usize,
    pub failure_count: usize,
    /// (file name, error message) of the last failure
    pub last_error: Option<(String, String)>,
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn cancelled_error() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "Operation cancelled")
}

/// Check that source and destination are distinct and the target is free
fn check_transfer(src: &Path, dest: &Path) -> io::Result<()> {
    let resolved_src = src.canonicalize()?;
    if dest.exists() {
        let resolved_dest = dest.canonicalize()?;
        if resolved_src == resolved_dest {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Source and destination are the same file",
            ));
        }
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Target already exists. Delete it first or choose a different name.",
        ));
    }

    // Copying a directory into its own subtree never terminates
    if resolved_src.is_dir() {
        if let Some(dest_parent) = dest.parent().and_then(|p| p.canonicalize().ok()) {
            if dest_parent.starts_with(&resolved_src) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Cannot copy a directory into itself",
                ));
            }
        }
    }

    Ok(())
}

/// Copy a file or directory, calling `on_chunk` with every block of bytes written.
/// An error from `on_chunk` aborts the copy.
pub fn copy_file(
    src: &Path,
    dest: &Path,
    on_chunk: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    check_transfer(src, dest)?;

    if src.is_dir() {
        let mut visited = HashSet::new();
        copy_dir_recursive(src, dest, &mut visited, 0, on_chunk)
    } else {
        copy_regular_file(src, dest, on_chunk)
    }
}

fn copy_regular_file(
    src: &Path,
    dest: &Path,
    on_chunk: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    let mut reader = File::open(src)?;
    let mut writer = File::create(dest)?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    let result = (|| {
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            on_chunk(n as u64)?;
        }
        writer.flush()
    })();

    match result {
        Ok(()) => {
            if let Ok(meta) = fs::metadata(src) {
                let _ = fs::set_permissions(dest, meta.permissions());
            }
            Ok(())
        }
        Err(e) => {
            // Don't leave a truncated copy behind
            drop(writer);
            let _ = fs::remove_file(dest);
            Err(e)
        }
    }
}

/// Recursive copy with symlink loop detection
fn copy_dir_recursive(
    src: &Path,
    dest: &Path,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
    on_chunk: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    if depth > MAX_COPY_DEPTH {
        return Err(io::Error::other(format!(
            "Maximum directory depth ({}) exceeded - possible circular symlink",
            MAX_COPY_DEPTH
        )));
    }

    let canonical_src = src.canonicalize().unwrap_or_else(|_| src.to_path_buf());
    if !visited.insert(canonical_src) {
        return Err(io::Error::other(format!(
            "Circular symlink detected: {}",
            src.display()
        )));
    }

    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        // Get metadata without following symlinks
        let metadata = fs::symlink_metadata(&src_path)?;

        if metadata.is_symlink() {
            #[cfg(unix)]
            {
                let link_target = fs::read_link(&src_path)?;
                std::os::unix::fs::symlink(&link_target, &dest_path)?;
            }
            #[cfg(not(unix))]
            {
                if src_path.is_file() {
                    copy_regular_file(&src_path, &dest_path, on_chunk)?;
                }
            }
        } else if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dest_path, visited, depth + 1, on_chunk)?;
        } else {
            copy_regular_file(&src_path, &dest_path, on_chunk)?;
        }
    }

    Ok(())
}

/// Move a file or directory. `on_chunk` only fires on the cross-device copy path.
pub fn move_file(
    src: &Path,
    dest: &Path,
    on_chunk: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    check_transfer(src, dest)?;

    // Try rename first (fast for same filesystem)
    match fs::rename(src, dest) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If rename fails (cross-device), copy then delete
            if e.raw_os_error() == Some(libc::EXDEV) {
                copy_file(src, dest, on_chunk)?;
                delete_file(src)
            } else {
                Err(e)
            }
        }
    }
}

/// Delete a file or directory
pub fn delete_file(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;

    if metadata.is_symlink() {
        // Just remove the symlink itself, don't follow it
        fs::remove_file(path)
    } else if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Validate filename for dangerous characters
pub fn is_valid_filename(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name.trim().is_empty() {
        return Err("Filename cannot be empty");
    }

    if name.contains('/') || name.contains('\\') {
        return Err("Filename cannot contain path separators");
    }

    if name.contains('\0') {
        return Err("Filename cannot contain null bytes");
    }

    if name == "." || name == ".." {
        return Err("Invalid filename");
    }

    Ok(())
}

/// Total size in bytes of a file or directory tree. Symlinks count as zero.
pub fn total_size(path: &Path) -> u64 {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return 0,
    };
    if metadata.is_symlink() {
        0
    } else if metadata.is_dir() {
        fs::read_dir(path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| total_size(&e.path()))
                    .sum()
            })
            .unwrap_or(0)
    } else {
        metadata.len()
    }
}

#[derive(Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

/// Copy `files` into `target_dir`, reporting progress on `tx`
pub fn copy_files_with_progress(
    files: Vec<PathBuf>,
    target_dir: &Path,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    transfer_with_progress(Transfer::Copy, files, target_dir, cancel_flag, tx);
}

/// Move `files` into `target_dir`, reporting progress on `tx`
pub fn move_files_with_progress(
    files: Vec<PathBuf>,
    target_dir: &Path,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    transfer_with_progress(Transfer::Move, files, target_dir, cancel_flag, tx);
}

fn transfer_with_progress(
    kind: Transfer,
    files: Vec<PathBuf>,
    target_dir: &Path,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    let total_files = files.len();
    let total_bytes: u64 = files.iter().map(|f| total_size(f)).sum();
    let mut completed_bytes = 0u64;
    let mut success = 0;
    let mut failure = 0;

    log::info!(
        "{} {} item(s), {} bytes, into {}",
        match kind {
            Transfer::Copy => "Copying",
            Transfer::Move => "Moving",
        },
        total_files,
        total_bytes,
        target_dir.display()
    );

    for (index, src) in files.iter().enumerate() {
        if cancel_flag.load(Ordering::Relaxed) {
            log::info!("Transfer cancelled after {} of {} item(s)", index, total_files);
            break;
        }

        let name = display_name(src);
        let dest = target_dir.join(&name);
        let item_total = total_size(src);
        let bytes_before_item = completed_bytes;
        let mut item_done = 0u64;
        let _ = tx.send(ProgressMessage::FileStarted(name.clone()));
        let _ = tx.send(ProgressMessage::TotalProgress(
            index,
            total_files,
            completed_bytes,
            total_bytes,
        ));

        let mut on_chunk = |n: u64| -> io::Result<()> {
            item_done += n;
            completed_bytes += n;
            let _ = tx.send(ProgressMessage::FileProgress(item_done, item_total));
            let _ = tx.send(ProgressMessage::TotalProgress(
                index,
                total_files,
                completed_bytes,
                total_bytes,
            ));
            if cancel_flag.load(Ordering::Relaxed) {
                Err(cancelled_error())
            } else {
                Ok(())
            }
        };

        let result = match kind {
            Transfer::Copy => copy_file(src, &dest, &mut on_chunk),
            Transfer::Move => move_file(src, &dest, &mut on_chunk),
        };

        match result {
            Ok(()) => {
                success += 1;
                // A same-device move renames without reporting chunks
                completed_bytes = bytes_before_item + item_total;
                let _ = tx.send(ProgressMessage::FileCompleted(name));
            }
            Err(e) => {
                failure += 1;
                log::warn!("Transfer of {} failed: {}", src.display(), e);
                let _ = tx.send(ProgressMessage::Error(name, e.to_string()));
            }
        }

        let _ = tx.send(ProgressMessage::TotalProgress(
            index + 1,
            total_files,
            completed_bytes,
            total_bytes,
        ));
    }

    log::info!("Transfer finished: {} succeeded, {} failed", success, failure);
    let _ = tx.send(ProgressMessage::Completed(success, failure));
}

/// Delete `files`, reporting progress on `tx`
pub fn delete_files_with_progress(
    files: Vec<PathBuf>,
    cancel_flag: Arc<AtomicBool>,
    tx: Sender<ProgressMessage>,
) {
    let total_files = files.len();
    let mut success = 0;
    let mut failure = 0;

    log::info!("Deleting {} item(s)", total_files);

    for (index, path) in files.iter().enumerate() {
        if cancel_flag.load(Ordering::Relaxed) {
            log::info!("Delete cancelled after {} of {} item(s)", index, total_files);
            break;
        }

        let name = display_name(path);
        let _ = tx.send(ProgressMessage::FileStarted(name.clone()));
        let _ = tx.send(ProgressMessage::TotalProgress(index, total_files, 0, 0));

        match delete_file(path) {
            Ok(()) => {
                success += 1;
                let _ = tx.send(ProgressMessage::FileCompleted(name));
            }
            Err(e) => {
                failure += 1;
                log::warn!("Delete of {} failed: {}", path.display(), e);
                let _ = tx.send(ProgressMessage::Error(name, e.to_string()));
            }
        }

        let _ = tx.send(ProgressMessage::TotalProgress(index + 1, total_files, 0, 0));
    }

    log::info!("Delete finished: {} succeeded, {} failed", success, failure);
    let _ = tx.send(ProgressMessage::Completed(success, failure));
}

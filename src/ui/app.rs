use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use chrono::{DateTime, Local};

use crate::config::Settings;
use crate::services::file_ops::{self, FileOperationResult, FileOperationType, ProgressMessage};
use crate::services::modifier::{self, Modification, UndoSnapshot};
use crate::ui::text_file::TextFileState;
use crate::utils::format::{file_type_label, is_text_file, summarize_names};

/// Entries of the batch-operation menu, in display order
pub const BATCH_OPERATIONS: [&str; 3] = ["Find and Replace", "Append Text", "Prepend Text"];

/// Get a valid directory path, falling back to parent directories if needed
pub fn get_valid_path(target_path: &Path, fallback: &Path) -> PathBuf {
    let mut current = target_path.to_path_buf();

    loop {
        if current.is_dir() && fs::read_dir(&current).is_ok() {
            return current;
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    if fallback.is_dir() && fs::read_dir(fallback).is_ok() {
        return fallback.to_path_buf();
    }

    PathBuf::from("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Name,
    Size,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

pub fn parse_sort_by(s: &str) -> SortBy {
    match s.to_lowercase().as_str() {
        "size" => SortBy::Size,
        "modified" | "date" => SortBy::Modified,
        _ => SortBy::Name,
    }
}

pub fn parse_sort_order(s: &str) -> SortOrder {
    match s.to_lowercase().as_str() {
        "desc" => SortOrder::Desc,
        _ => SortOrder::Asc,
    }
}

pub fn sort_by_to_string(sort_by: SortBy) -> String {
    match sort_by {
        SortBy::Name => "name",
        SortBy::Size => "size",
        SortBy::Modified => "modified",
    }
    .to_string()
}

pub fn sort_order_to_string(sort_order: SortOrder) -> String {
    match sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Browser,
    TextFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogType {
    Delete,
    BatchMenu,
    FindReplace,
    Append,
    Prepend,
    Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardOperation {
    Copy,
    Cut,
}

/// Files marked for copy/cut, pasted into whatever directory is current
#[derive(Debug, Clone)]
pub struct Clipboard {
    pub files: Vec<PathBuf>,
    pub source_path: PathBuf,
    pub operation: ClipboardOperation,
}

/// State of the running background operation, fed by its progress channel
pub struct OperationProgress {
    pub operation_type: FileOperationType,
    pub label: String,
    pub is_active: bool,
    pub cancel_flag: Arc<AtomicBool>,
    receiver: Option<Receiver<ProgressMessage>>,

    pub current_file: String,
    pub current_file_progress: f64, // 0.0 ~ 1.0
    pub total_files: usize,
    pub completed_files: usize,
    pub total_bytes: u64,
    pub completed_bytes: u64,

    pub result: Option<FileOperationResult>,

    last_error: Option<(String, String)>,
    snapshot: Option<UndoSnapshot>,
}

impl OperationProgress {
    pub fn new(operation_type: FileOperationType, label: &str) -> Self {
        Self {
            operation_type,
            label: label.to_string(),
            is_active: false,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            receiver: None,
            current_file: String::new(),
            current_file_progress: 0.0,
            total_files: 0,
            completed_files: 0,
            total_bytes: 0,
            completed_bytes: 0,
            result: None,
            last_error: None,
            snapshot: None,
        }
    }

    pub fn cancel(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Poll for progress messages. Returns true if still active.
    pub fn poll(&mut self) -> bool {
        if !self.is_active {
            return false;
        }

        let Some(receiver) = self.receiver.as_ref() else {
            return self.is_active;
        };

        loop {
            match receiver.try_recv() {
                Ok(ProgressMessage::FileStarted(name)) => {
                    self.current_file = name;
                    self.current_file_progress = 0.0;
                }
                Ok(ProgressMessage::FileProgress(done, total)) => {
                    if total > 0 {
                        self.current_file_progress = done as f64 / total as f64;
                    }
                }
                Ok(ProgressMessage::FileCompleted(_)) => {
                    self.current_file_progress = 1.0;
                }
                Ok(ProgressMessage::TotalProgress(completed_files, total_files, completed_bytes, total_bytes)) => {
                    self.completed_files = completed_files;
                    self.total_files = total_files;
                    self.completed_bytes = completed_bytes;
                    self.total_bytes = total_bytes;
                }
                Ok(ProgressMessage::Error(name, err)) => {
                    self.last_error = Some((name, err));
                }
                Ok(ProgressMessage::Modified(snapshot)) => {
                    self.snapshot = Some(snapshot);
                }
                Ok(ProgressMessage::Completed(success, failure)) => {
                    self.result = Some(FileOperationResult {
                        success_count: success,
                        failure_count: failure,
                        last_error: self.last_error.take(),
                    });
                    self.is_active = false;
                    return false;
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.is_active = false;
                    return false;
                }
            }
        }

        self.is_active
    }

    /// Overall progress (0.0 ~ 1.0), by bytes when known
    pub fn overall_progress(&self) -> f64 {
        if self.total_bytes > 0 {
            self.completed_bytes as f64 / self.total_bytes as f64
        } else if self.total_files > 0 {
            self.completed_files as f64 / self.total_files as f64
        } else {
            0.0
        }
    }

    /// 1-based index of the file being processed
    pub fn current_index(&self) -> usize {
        (self.completed_files + 1).min(self.total_files.max(1))
    }

    pub fn take_snapshot(&mut self) -> Option<UndoSnapshot> {
        self.snapshot.take()
    }
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub dialog_type: DialogType,
    pub input: String,
    /// Replacement text of the find/replace dialog
    pub replace_input: String,
    /// 0: input, 1: replace_input
    pub input_focus: usize,
    pub message: String,
    /// Yes/No button, or menu entry for the batch menu
    pub selected_button: usize,
}

impl Dialog {
    pub fn new(dialog_type: DialogType) -> Self {
        Self {
            dialog_type,
            input: String::new(),
            replace_input: String::new(),
            input_focus: 0,
            message: String::new(),
            selected_button: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileItem {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: DateTime<Local>,
}

impl FileItem {
    pub fn type_label(&self) -> String {
        file_type_label(&self.name, self.is_directory)
    }
}

/// The directory listing being browsed
#[derive(Debug)]
pub struct PanelState {
    pub path: PathBuf,
    /// Top of the browsable tree; going back stops here
    pub root: PathBuf,
    pub files: Vec<FileItem>,
    pub selected_index: usize,
    pub selected_files: HashSet<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub scroll_offset: usize,
    pub pending_focus: Option<String>,
}

impl PanelState {
    pub fn new(path: PathBuf, root: PathBuf, sort_by: SortBy, sort_order: SortOrder) -> Self {
        let mut state = Self {
            path,
            root,
            files: Vec::new(),
            selected_index: 0,
            selected_files: HashSet::new(),
            sort_by,
            sort_order,
            scroll_offset: 0,
            pending_focus: None,
        };
        if let Err(e) = state.load_files() {
            log::warn!("Failed to read directory {}: {}", state.path.display(), e);
        }
        state
    }

    /// Reload the listing: directories first, then by the current sort key
    pub fn load_files(&mut self) -> io::Result<()> {
        self.files.clear();

        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                self.selected_index = 0;
                return Err(e);
            }
        };

        let mut items: Vec<FileItem> = entries
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                // follow symlinks; a dangling link is listed as itself
                let metadata = fs::metadata(entry.path())
                    .or_else(|_| entry.metadata())
                    .ok()?;
                let is_directory = metadata.is_dir();
                let size = if is_directory { 0 } else { metadata.len() };
                let modified = metadata
                    .modified()
                    .ok()
                    .map(DateTime::<Local>::from)
                    .unwrap_or_else(Local::now);

                Some(FileItem {
                    name,
                    is_directory,
                    size,
                    modified,
                })
            })
            .collect();

        items.sort_by(|a, b| {
            if a.is_directory != b.is_directory {
                return b.is_directory.cmp(&a.is_directory);
            }

            let cmp = match self.sort_by {
                SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortBy::Size => a.size.cmp(&b.size),
                SortBy::Modified => a.modified.cmp(&b.modified),
            };

            match self.sort_order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        });

        self.files = items;

        // Drop marks for entries that no longer exist
        let names: HashSet<&str> = self.files.iter().map(|f| f.name.as_str()).collect();
        self.selected_files.retain(|n| names.contains(n.as_str()));

        if let Some(focus_name) = self.pending_focus.take() {
            if let Some(idx) = self.files.iter().position(|f| f.name == focus_name) {
                self.selected_index = idx;
            }
        }

        if self.selected_index >= self.files.len() {
            self.selected_index = self.files.len().saturating_sub(1);
        }

        Ok(())
    }

    pub fn current_file(&self) -> Option<&FileItem> {
        self.files.get(self.selected_index)
    }

    pub fn toggle_sort(&mut self, sort_by: SortBy) -> io::Result<()> {
        if self.sort_by == sort_by {
            self.sort_order = match self.sort_order {
                SortOrder::Asc => SortOrder::Desc,
                SortOrder::Desc => SortOrder::Asc,
            };
        } else {
            self.sort_by = sort_by;
            self.sort_order = SortOrder::Asc;
        }
        self.selected_index = 0;
        self.load_files()
    }

    /// Directory name shown in the header, "Storage" for a nameless root
    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Storage".to_string())
    }

    pub fn is_at_root(&self) -> bool {
        self.path == self.root || self.path.parent().is_none()
    }

    /// Marked entries as full paths, in listing order
    pub fn selected_paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| self.selected_files.contains(&f.name))
            .map(|f| self.path.join(&f.name))
            .collect()
    }
}

pub struct App {
    pub settings: Settings,
    pub panel: PanelState,
    pub current_screen: Screen,
    pub dialog: Option<Dialog>,
    pub message: Option<String>,
    pub message_timer: u8,

    pub text_file: Option<TextFileState>,
    pub clipboard: Option<Clipboard>,
    pub operation_progress: Option<OperationProgress>,

    /// Single undo level: originals of the last modification
    pub undo_snapshot: Option<UndoSnapshot>,

    pub should_quit: bool,
}

impl App {
    pub fn new(settings: Settings, start_path: PathBuf) -> Self {
        let fallback = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let root = get_valid_path(&start_path, &fallback);
        let panel = PanelState::new(
            root.clone(),
            root,
            parse_sort_by(&settings.sort_by),
            parse_sort_order(&settings.sort_order),
        );

        Self {
            settings,
            panel,
            current_screen: Screen::Browser,
            dialog: None,
            message: None,
            message_timer: 0,
            text_file: None,
            clipboard: None,
            operation_progress: None,
            undo_snapshot: None,
            should_quit: false,
        }
    }

    pub fn show_message(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_timer = 30; // ~3 seconds at 10 FPS
    }

    pub fn is_busy(&self) -> bool {
        self.operation_progress.as_ref().map(|p| p.is_active).unwrap_or(false)
    }

    pub fn is_selection_mode(&self) -> bool {
        !self.panel.selected_files.is_empty()
    }

    // ========== Navigation ==========

    pub fn move_cursor(&mut self, delta: i32) {
        let panel = &mut self.panel;
        let new_index = (panel.selected_index as i32 + delta)
            .max(0)
            .min(panel.files.len().saturating_sub(1) as i32) as usize;
        panel.selected_index = new_index;
    }

    pub fn cursor_to_start(&mut self) {
        self.panel.selected_index = 0;
    }

    pub fn cursor_to_end(&mut self) {
        self.panel.selected_index = self.panel.files.len().saturating_sub(1);
    }

    /// Reload the current listing, reporting a read failure
    pub fn refresh(&mut self) {
        if let Err(e) = self.panel.load_files() {
            log::warn!("Failed to read directory {}: {}", self.panel.path.display(), e);
            self.show_message(&format!("Error loading files: {}", e));
        }
    }

    pub fn navigate_to(&mut self, dir: PathBuf) {
        log::debug!("Navigate to {}", dir.display());
        self.panel.path = dir;
        self.panel.selected_index = 0;
        self.panel.scroll_offset = 0;
        self.panel.selected_files.clear();
        self.refresh();
    }

    /// Directory: enter it. Text file: open it. Anything else is refused.
    pub fn enter_selected(&mut self) {
        let Some(file) = self.panel.current_file().cloned() else {
            return;
        };
        let path = self.panel.path.join(&file.name);

        if file.is_directory {
            self.navigate_to(path);
        } else if is_text_file(&file.name, &self.settings.text_extensions) {
            self.open_text_file(path);
        } else {
            self.show_message("Unsupported file type");
        }
    }

    /// Go to the parent directory. Returns false at the browsing root.
    pub fn go_back(&mut self) -> bool {
        if self.panel.is_at_root() {
            self.show_message("Already at storage root");
            return false;
        }

        let focus = self
            .panel
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        if let Some(parent) = self.panel.path.parent().map(Path::to_path_buf) {
            self.panel.pending_focus = focus;
            self.navigate_to(parent);
        }
        true
    }

    pub fn toggle_sort(&mut self, sort_by: SortBy) {
        if let Err(e) = self.panel.toggle_sort(sort_by) {
            self.show_message(&format!("Error loading files: {}", e));
        }
    }

    // ========== Selection ==========

    /// Mark/unmark the entry under the cursor, entering selection mode
    pub fn toggle_selection(&mut self) {
        let panel = &mut self.panel;
        if let Some(file) = panel.current_file() {
            let name = file.name.clone();
            if !panel.selected_files.remove(&name) {
                panel.selected_files.insert(name);
            }
            if panel.selected_index + 1 < panel.files.len() {
                panel.selected_index += 1;
            }
        }
    }

    pub fn toggle_all_selection(&mut self) {
        let panel = &mut self.panel;
        if panel.selected_files.is_empty() {
            panel.selected_files = panel.files.iter().map(|f| f.name.clone()).collect();
        } else {
            panel.selected_files.clear();
        }
    }

    pub fn exit_selection_mode(&mut self) {
        self.panel.selected_files.clear();
    }

    /// Marked entries, or the entry under the cursor when nothing is marked
    pub fn get_operation_files(&self) -> Vec<PathBuf> {
        if self.is_selection_mode() {
            self.panel.selected_paths()
        } else {
            self.panel
                .current_file()
                .map(|f| vec![self.panel.path.join(&f.name)])
                .unwrap_or_default()
        }
    }

    fn operation_names(files: &[PathBuf]) -> String {
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        summarize_names(&names)
    }

    // ========== Text screen ==========

    pub fn open_text_file(&mut self, path: PathBuf) {
        log::info!("Open text file {}", path.display());
        self.text_file = Some(TextFileState::open(path));
        self.current_screen = Screen::TextFile;
    }

    pub fn close_text_file(&mut self) {
        self.text_file = None;
        self.current_screen = Screen::Browser;
        self.refresh();
    }

    pub fn save_text_file(&mut self) {
        let Some(state) = self.text_file.as_ref() else {
            return;
        };
        if !state.is_loaded() {
            self.show_message("Save failed: file is not loaded");
            return;
        }
        let path = state.file_path.clone();
        let content = state.content();

        self.start_operation(FileOperationType::Save, "Saving file", move |cancel, tx| {
            modifier::modify_file(path, content, cancel, tx);
        });
    }

    // ========== Background operations ==========

    fn start_operation<F>(&mut self, operation_type: FileOperationType, label: &str, worker: F)
    where
        F: FnOnce(Arc<AtomicBool>, Sender<ProgressMessage>) + Send + 'static,
    {
        if self.is_busy() {
            self.show_message("Another operation is in progress");
            return;
        }

        let mut progress = OperationProgress::new(operation_type, label);
        progress.is_active = true;
        let cancel_flag = progress.cancel_flag.clone();

        let (tx, rx) = mpsc::channel();
        progress.receiver = Some(rx);

        thread::spawn(move || worker(cancel_flag, tx));

        self.operation_progress = Some(progress);
        self.dialog = Some(Dialog::new(DialogType::Progress));
    }

    pub fn cancel_operation(&mut self) {
        if let Some(progress) = self.operation_progress.as_mut() {
            log::info!("Cancelling {}", progress.label);
            progress.cancel();
        }
    }

    /// Drain background channels and expire the status message; call once per frame
    pub fn tick(&mut self) {
        if self.message_timer > 0 {
            self.message_timer -= 1;
            if self.message_timer == 0 {
                self.message = None;
            }
        }

        let finished = self
            .operation_progress
            .as_mut()
            .map(|p| !p.poll())
            .unwrap_or(false);
        if finished {
            self.finish_operation();
        }

        if let Some(state) = self.text_file.as_mut() {
            state.poll();
        }
    }

    fn finish_operation(&mut self) {
        let Some(mut progress) = self.operation_progress.take() else {
            return;
        };
        if matches!(self.dialog.as_ref().map(|d| d.dialog_type), Some(DialogType::Progress)) {
            self.dialog = None;
        }

        // Only a modification that rewrote something replaces the undo level
        if let Some(snapshot) = progress.take_snapshot() {
            log::debug!("Undo level now holds {} file(s) from \"{}\"", snapshot.len(), snapshot.label);
            self.undo_snapshot = Some(snapshot);
        }

        let result = progress.result.clone().unwrap_or_default();
        let failed = result.failure_count > 0;
        let error_detail = result
            .last_error
            .as_ref()
            .map(|(name, msg)| format!("Error {} {}: {}", progress.operation_type.verb(), name, msg))
            .unwrap_or_default();
        let error_suffix = if result.failure_count > 1 {
            format!(" ({} files failed)", result.failure_count)
        } else {
            String::new()
        };

        let message = if progress.is_cancelled() {
            format!("{} cancelled", progress.label)
        } else {
            match progress.operation_type {
                FileOperationType::Save => {
                    if failed || progress.result.is_none() {
                        let reason = result
                            .last_error
                            .map(|(_, msg)| msg)
                            .unwrap_or_else(|| "operation interrupted".to_string());
                        format!("Save failed: {}", reason)
                    } else {
                        if let Some(state) = self.text_file.as_mut() {
                            state.mark_saved();
                        }
                        "File saved successfully".to_string()
                    }
                }
                FileOperationType::Undo => {
                    if let Some(state) = self.text_file.as_mut() {
                        state.reload();
                    }
                    if failed {
                        format!("Undo failed. {}{}", error_detail, error_suffix)
                    } else {
                        "Undo successful".to_string()
                    }
                }
                FileOperationType::Modify => {
                    if failed {
                        format!("{}{}", error_detail, error_suffix)
                    } else {
                        format!("{} completed", progress.label)
                    }
                }
                FileOperationType::Delete | FileOperationType::Copy | FileOperationType::Move => {
                    if failed {
                        format!("{}{}", error_detail, error_suffix)
                    } else {
                        let done = match progress.operation_type {
                            FileOperationType::Delete => "Deleted",
                            FileOperationType::Copy => "Copied",
                            _ => "Moved",
                        };
                        format!("{} {} file(s)", done, result.success_count)
                    }
                }
            }
        };

        log::info!("{}: {}", progress.label, message);

        if progress.operation_type != FileOperationType::Save
            && progress.operation_type != FileOperationType::Undo
        {
            self.exit_selection_mode();
        }
        self.refresh();
        self.show_message(&message);
    }

    // ========== Delete ==========

    pub fn show_delete_dialog(&mut self) {
        let files = self.get_operation_files();
        if files.is_empty() {
            self.show_message("No files selected");
            return;
        }
        let mut dialog = Dialog::new(DialogType::Delete);
        dialog.message = format!("Delete {}?", Self::operation_names(&files));
        dialog.selected_button = 1; // default: No
        self.dialog = Some(dialog);
    }

    pub fn execute_delete(&mut self) {
        let files = self.get_operation_files();
        if files.is_empty() {
            self.show_message("No files selected");
            return;
        }

        self.start_operation(FileOperationType::Delete, "Deleting files", move |cancel, tx| {
            file_ops::delete_files_with_progress(files, cancel, tx);
        });
    }

    // ========== Clipboard (copy / move into the current directory) ==========

    pub fn clipboard_copy(&mut self) {
        self.fill_clipboard(ClipboardOperation::Copy);
    }

    pub fn clipboard_cut(&mut self) {
        self.fill_clipboard(ClipboardOperation::Cut);
    }

    fn fill_clipboard(&mut self, operation: ClipboardOperation) {
        let files = self.get_operation_files();
        if files.is_empty() {
            self.show_message("No files selected");
            return;
        }
        let count = files.len();
        self.clipboard = Some(Clipboard {
            files,
            source_path: self.panel.path.clone(),
            operation,
        });
        self.exit_selection_mode();

        let verb = match operation {
            ClipboardOperation::Copy => "copied",
            ClipboardOperation::Cut => "cut",
        };
        self.show_message(&format!("{} file(s) {} to clipboard", count, verb));
    }

    /// Paste the clipboard into the current directory
    pub fn clipboard_paste(&mut self) {
        if self.is_busy() {
            self.show_message("Another operation is in progress");
            return;
        }
        let Some(clipboard) = self.clipboard.take() else {
            self.show_message("Clipboard is empty");
            return;
        };

        let target_path = self.panel.path.clone();

        let is_same_folder = match (clipboard.source_path.canonicalize(), target_path.canonicalize()) {
            (Ok(src), Ok(dest)) => src == dest,
            _ => clipboard.source_path == target_path,
        };
        if is_same_folder {
            self.clipboard = Some(clipboard);
            self.show_message("Source and target are the same folder");
            return;
        }

        if !clipboard.source_path.exists() {
            self.show_message("Source folder no longer exists");
            return;
        }

        for path in &clipboard.files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Err(reason) = file_ops::is_valid_filename(&name) {
                self.show_message(&format!("Cannot paste {}: {}", path.display(), reason));
                return;
            }
        }

        let files = clipboard.files.clone();
        let operation = clipboard.operation;

        match operation {
            ClipboardOperation::Copy => {
                self.start_operation(FileOperationType::Copy, "Copying files", move |cancel, tx| {
                    file_ops::copy_files_with_progress(files, &target_path, cancel, tx);
                });
                // Copies can be pasted again
                self.clipboard = Some(clipboard);
            }
            ClipboardOperation::Cut => {
                self.start_operation(FileOperationType::Move, "Moving files", move |cancel, tx| {
                    file_ops::move_files_with_progress(files, &target_path, cancel, tx);
                });
            }
        }
    }

    pub fn clipboard_info(&self) -> Option<(usize, &str)> {
        self.clipboard.as_ref().map(|cb| {
            let op = match cb.operation {
                ClipboardOperation::Copy => "copy",
                ClipboardOperation::Cut => "cut",
            };
            (cb.files.len(), op)
        })
    }

    // ========== Batch modification ==========

    pub fn show_batch_operations_dialog(&mut self) {
        if self.get_operation_files().is_empty() {
            self.show_message("No files selected");
            return;
        }
        self.dialog = Some(Dialog::new(DialogType::BatchMenu));
    }

    /// Open the input dialog for a batch menu entry
    pub fn open_modification_dialog(&mut self, index: usize) {
        let dialog_type = match index {
            0 => DialogType::FindReplace,
            1 => DialogType::Append,
            2 => DialogType::Prepend,
            _ => return,
        };
        self.dialog = Some(Dialog::new(dialog_type));
    }

    pub fn execute_modification(&mut self, modification: Modification) {
        let files = self.get_operation_files();
        if files.is_empty() {
            self.show_message("No files selected");
            return;
        }
        if let Err(e) = modification.validate() {
            self.show_message(&e.to_string());
            return;
        }

        let label = modification.label();
        self.start_operation(FileOperationType::Modify, label, move |cancel, tx| {
            modifier::modify_files(files, modification, cancel, tx);
        });
    }

    /// Restore the files changed by the last modification
    pub fn undo_last_modification(&mut self) {
        if self.is_busy() {
            self.show_message("Another operation is in progress");
            return;
        }
        let Some(snapshot) = self.undo_snapshot.take() else {
            self.show_message("Nothing to undo");
            return;
        };

        let label = format!("Undoing {}", snapshot.label.to_lowercase());
        self.start_operation(FileOperationType::Undo, &label, move |cancel, tx| {
            modifier::undo(snapshot, cancel, tx);
        });
    }

    // ========== Lifecycle ==========

    pub fn save_settings(&mut self) {
        self.settings.sort_by = sort_by_to_string(self.panel.sort_by);
        self.settings.sort_order = sort_order_to_string(self.panel.sort_order);
        if let Err(e) = self.settings.save() {
            log::warn!("Could not save settings: {}", e);
        }
    }

    pub fn request_quit(&mut self) {
        if self.is_busy() {
            self.show_message("Operation in progress. Esc to cancel it first");
            return;
        }
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::modifier::UndoEntry;
    use std::time::Duration;
    use tempfile::TempDir;

    fn new_app(dir: &Path) -> App {
        App::new(Settings::default(), dir.to_path_buf())
    }

    fn wait_for_operation(app: &mut App) {
        for _ in 0..500 {
            app.tick();
            if app.operation_progress.is_none() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("operation did not finish");
    }

    fn wait_for_text_load(app: &mut App) {
        for _ in 0..500 {
            app.tick();
            if app.text_file.as_ref().map(|s| !s.is_loading()).unwrap_or(true) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("text file did not load");
    }

    fn select_names(app: &mut App, names: &[&str]) {
        for name in names {
            app.panel.selected_files.insert(name.to_string());
        }
    }

    // ========== get_valid_path tests ==========

    #[test]
    fn test_get_valid_path_existing() {
        let temp = TempDir::new().unwrap();
        let result = get_valid_path(temp.path(), Path::new("/tmp"));
        assert_eq!(result, temp.path());
    }

    #[test]
    fn test_get_valid_path_nonexistent_uses_parent() {
        let temp = TempDir::new().unwrap();
        let result = get_valid_path(&temp.path().join("does_not_exist"), Path::new("/tmp"));
        assert_eq!(result, temp.path());
    }

    #[test]
    fn test_get_valid_path_root() {
        let result = get_valid_path(Path::new("/"), Path::new("/tmp"));
        assert_eq!(result, PathBuf::from("/"));
    }

    #[test]
    fn test_sort_setting_parsing() {
        assert_eq!(parse_sort_by("Size"), SortBy::Size);
        assert_eq!(parse_sort_by("date"), SortBy::Modified);
        assert_eq!(parse_sort_by("bogus"), SortBy::Name);
        assert_eq!(parse_sort_order("desc"), SortOrder::Desc);
        assert_eq!(parse_sort_order(""), SortOrder::Asc);
        assert_eq!(sort_by_to_string(SortBy::Modified), "modified");
        assert_eq!(sort_order_to_string(SortOrder::Desc), "desc");
    }

    // ========== PanelState tests ==========

    #[test]
    fn test_listing_directories_first_then_case_insensitive_name() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("beta.txt"), "").unwrap();
        fs::write(temp.path().join("Alpha.txt"), "").unwrap();
        fs::create_dir(temp.path().join("zeta")).unwrap();
        fs::create_dir(temp.path().join("Docs")).unwrap();

        let app = new_app(temp.path());
        let names: Vec<&str> = app.panel.files.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["Docs", "zeta", "Alpha.txt", "beta.txt"]);
        assert!(!names.contains(&".."));
    }

    #[test]
    fn test_toggle_sort() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "1").unwrap();
        fs::write(temp.path().join("b.txt"), "22").unwrap();
        let mut app = new_app(temp.path());

        app.toggle_sort(SortBy::Name);
        assert_eq!(app.panel.sort_order, SortOrder::Desc);
        assert_eq!(app.panel.files[0].name, "b.txt");

        app.toggle_sort(SortBy::Size);
        assert_eq!(app.panel.sort_by, SortBy::Size);
        assert_eq!(app.panel.sort_order, SortOrder::Asc);
        assert_eq!(app.panel.files[0].name, "a.txt");
    }

    #[test]
    fn test_title_uses_directory_name() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("Music");
        fs::create_dir(&sub).unwrap();
        let app = new_app(&sub);
        assert_eq!(app.panel.title(), "Music");

        let root = PanelState::new(PathBuf::from("/"), PathBuf::from("/"), SortBy::Name, SortOrder::Asc);
        assert_eq!(root.title(), "Storage");
    }

    #[test]
    fn test_type_labels() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("folder")).unwrap();
        fs::write(temp.path().join("data.json"), "{}").unwrap();
        fs::write(temp.path().join("README"), "").unwrap();
        let app = new_app(temp.path());

        let labels: Vec<String> = app.panel.files.iter().map(|f| f.type_label()).collect();
        assert_eq!(labels, vec!["Folder", "JSON File", "File"]);
    }

    // ========== Navigation tests ==========

    #[test]
    fn test_enter_directory_and_go_back() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("alpha")).unwrap();
        fs::create_dir(temp.path().join("beta")).unwrap();
        let mut app = new_app(temp.path());

        app.move_cursor(1);
        app.enter_selected();
        assert_eq!(app.panel.path, temp.path().join("beta"));

        assert!(app.go_back());
        assert_eq!(app.panel.path, temp.path());
        // cursor returns to the directory we came from
        assert_eq!(app.panel.current_file().unwrap().name, "beta");
    }

    #[test]
    fn test_go_back_refused_at_root() {
        let temp = TempDir::new().unwrap();
        let mut app = new_app(temp.path());

        assert!(!app.go_back());
        assert_eq!(app.panel.path, temp.path());
        assert_eq!(app.message.as_deref(), Some("Already at storage root"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_entered() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real").join("inside.txt"), "").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alink")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("broken")).unwrap();
        let mut app = new_app(temp.path());

        let listed: Vec<(&str, bool)> = app
            .panel
            .files
            .iter()
            .map(|f| (f.name.as_str(), f.is_directory))
            .collect();
        assert_eq!(listed, vec![("alink", true), ("real", true), ("broken", false)]);

        app.enter_selected();

        assert_eq!(app.panel.path, temp.path().join("alink"));
        assert_eq!(app.panel.files[0].name, "inside.txt");
    }

    #[test]
    fn test_enter_unsupported_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("photo.png"), [0u8, 1, 2]).unwrap();
        let mut app = new_app(temp.path());

        app.enter_selected();

        assert_eq!(app.current_screen, Screen::Browser);
        assert_eq!(app.message.as_deref(), Some("Unsupported file type"));
    }

    #[test]
    fn test_enter_text_file_opens_text_screen() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), "first\nsecond\n").unwrap();
        let mut app = new_app(temp.path());

        app.enter_selected();
        assert_eq!(app.current_screen, Screen::TextFile);

        wait_for_text_load(&mut app);
        let state = app.text_file.as_ref().unwrap();
        assert_eq!(state.lines, vec!["first", "second"]);

        app.close_text_file();
        assert_eq!(app.current_screen, Screen::Browser);
        assert!(app.text_file.is_none());
    }

    #[test]
    fn test_cursor_bounds() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp.path().join(format!("file{}.txt", i)), "").unwrap();
        }
        let mut app = new_app(temp.path());

        app.move_cursor(1000);
        assert_eq!(app.panel.selected_index, 4);
        app.move_cursor(-1000);
        assert_eq!(app.panel.selected_index, 0);
        app.cursor_to_end();
        assert_eq!(app.panel.selected_index, 4);
        app.cursor_to_start();
        assert_eq!(app.panel.selected_index, 0);
    }

    // ========== Selection tests ==========

    #[test]
    fn test_selection_mode() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        let mut app = new_app(temp.path());

        assert!(!app.is_selection_mode());
        app.toggle_selection();
        assert!(app.is_selection_mode());
        assert!(app.panel.selected_files.contains("a.txt"));
        assert_eq!(app.panel.selected_index, 1);

        app.move_cursor(-1);
        app.toggle_selection();
        assert!(!app.is_selection_mode());

        app.toggle_all_selection();
        assert_eq!(app.panel.selected_files.len(), 2);
        app.exit_selection_mode();
        assert!(!app.is_selection_mode());
    }

    #[test]
    fn test_operation_files_follow_listing_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("c.txt"), "").unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        let mut app = new_app(temp.path());

        // no marks: entry under cursor
        assert_eq!(app.get_operation_files(), vec![temp.path().join("a.txt")]);

        select_names(&mut app, &["c.txt", "a.txt"]);
        assert_eq!(
            app.get_operation_files(),
            vec![temp.path().join("a.txt"), temp.path().join("c.txt")]
        );
    }

    #[test]
    fn test_navigation_clears_selection() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();
        let mut app = new_app(temp.path());

        select_names(&mut app, &["a.txt"]);
        app.enter_selected();

        assert!(!app.is_selection_mode());
    }

    // ========== Batch modification tests ==========

    #[test]
    fn test_modification_with_empty_directory_reports_no_files() {
        let temp = TempDir::new().unwrap();
        let mut app = new_app(temp.path());

        app.execute_modification(Modification::append_text("x"));

        assert!(app.operation_progress.is_none());
        assert_eq!(app.message.as_deref(), Some("No files selected"));
    }

    #[test]
    fn test_find_replace_with_empty_pattern_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "abc").unwrap();
        let mut app = new_app(temp.path());

        app.execute_modification(Modification::find_and_replace("", "x"));

        assert!(app.operation_progress.is_none());
        assert_eq!(app.message.as_deref(), Some("Find text cannot be empty"));
    }

    #[test]
    fn test_batch_modification_then_undo() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "hello world").unwrap();
        fs::write(temp.path().join("b.txt"), "world peace").unwrap();
        fs::write(temp.path().join("c.txt"), "untouched").unwrap();
        let mut app = new_app(temp.path());
        select_names(&mut app, &["a.txt", "b.txt"]);

        app.execute_modification(Modification::find_and_replace("world", "moon"));
        assert_eq!(app.dialog.as_ref().map(|d| d.dialog_type), Some(DialogType::Progress));
        wait_for_operation(&mut app);

        assert!(app.dialog.is_none());
        assert_eq!(app.message.as_deref(), Some("Finding and replacing text completed"));
        assert!(!app.is_selection_mode());
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello moon");
        assert_eq!(fs::read_to_string(temp.path().join("b.txt")).unwrap(), "moon peace");
        assert_eq!(app.undo_snapshot.as_ref().map(|s| s.len()), Some(2));

        app.undo_last_modification();
        wait_for_operation(&mut app);

        assert_eq!(app.message.as_deref(), Some("Undo successful"));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello world");
        assert_eq!(fs::read_to_string(temp.path().join("b.txt")).unwrap(), "world peace");
        assert_eq!(fs::read_to_string(temp.path().join("c.txt")).unwrap(), "untouched");

        // single level: nothing left
        app.undo_last_modification();
        assert_eq!(app.message.as_deref(), Some("Nothing to undo"));
    }

    #[test]
    fn test_new_modification_replaces_undo_level() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "base").unwrap();
        let mut app = new_app(temp.path());

        app.execute_modification(Modification::append_text("-1"));
        wait_for_operation(&mut app);
        app.execute_modification(Modification::append_text("-2"));
        wait_for_operation(&mut app);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "base-1-2");

        app.undo_last_modification();
        wait_for_operation(&mut app);

        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "base-1");
    }

    #[test]
    fn test_batch_modification_reports_file_error() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("folder")).unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        let mut app = new_app(temp.path());
        select_names(&mut app, &["folder", "a.txt"]);

        app.execute_modification(Modification::prepend_text(">"));
        wait_for_operation(&mut app);

        assert_eq!(
            app.message.as_deref(),
            Some("Error modifying folder: Not a regular file")
        );
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), ">x");
    }

    #[test]
    fn test_batch_menu_opens_input_dialogs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        let mut app = new_app(temp.path());

        app.show_batch_operations_dialog();
        assert_eq!(app.dialog.as_ref().map(|d| d.dialog_type), Some(DialogType::BatchMenu));

        app.open_modification_dialog(0);
        assert_eq!(app.dialog.as_ref().map(|d| d.dialog_type), Some(DialogType::FindReplace));
        app.open_modification_dialog(2);
        assert_eq!(app.dialog.as_ref().map(|d| d.dialog_type), Some(DialogType::Prepend));
    }

    // ========== Delete / clipboard tests ==========

    #[test]
    fn test_delete_selected_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "").unwrap();
        fs::create_dir_all(temp.path().join("dir").join("inner")).unwrap();
        fs::write(temp.path().join("keep.txt"), "").unwrap();
        let mut app = new_app(temp.path());
        select_names(&mut app, &["a.txt", "dir"]);

        app.show_delete_dialog();
        let dialog = app.dialog.as_ref().unwrap();
        assert_eq!(dialog.dialog_type, DialogType::Delete);
        assert_eq!(dialog.selected_button, 1);

        app.dialog = None;
        app.execute_delete();
        wait_for_operation(&mut app);

        assert_eq!(app.message.as_deref(), Some("Deleted 2 file(s)"));
        assert!(!temp.path().join("a.txt").exists());
        assert!(!temp.path().join("dir").exists());
        assert!(temp.path().join("keep.txt").exists());
        assert_eq!(app.panel.files.len(), 1);
    }

    #[test]
    fn test_clipboard_copy_and_paste_into_other_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dest")).unwrap();
        fs::write(temp.path().join("file.txt"), "content").unwrap();
        let mut app = new_app(temp.path());

        select_names(&mut app, &["file.txt"]);
        app.clipboard_copy();
        assert_eq!(app.clipboard_info(), Some((1, "copy")));
        assert!(!app.is_selection_mode());

        app.navigate_to(temp.path().join("dest"));
        app.clipboard_paste();
        wait_for_operation(&mut app);

        assert_eq!(app.message.as_deref(), Some("Copied 1 file(s)"));
        assert!(temp.path().join("file.txt").exists());
        assert!(temp.path().join("dest").join("file.txt").exists());
        assert!(app.clipboard.is_some());
    }

    #[test]
    fn test_clipboard_cut_and_paste_moves() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("dest")).unwrap();
        fs::write(temp.path().join("file.txt"), "content").unwrap();
        let mut app = new_app(temp.path());

        select_names(&mut app, &["file.txt"]);
        app.clipboard_cut();
        app.navigate_to(temp.path().join("dest"));
        app.clipboard_paste();
        wait_for_operation(&mut app);

        assert!(!temp.path().join("file.txt").exists());
        assert!(temp.path().join("dest").join("file.txt").exists());
        assert!(app.clipboard.is_none());
    }

    #[test]
    fn test_clipboard_paste_same_folder_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file.txt"), "content").unwrap();
        let mut app = new_app(temp.path());

        app.clipboard_copy();
        app.clipboard_paste();

        assert!(app.operation_progress.is_none());
        assert!(app.clipboard.is_some());
        assert_eq!(app.message.as_deref(), Some("Source and target are the same folder"));
    }

    #[test]
    fn test_clipboard_empty_rejected() {
        let temp = TempDir::new().unwrap();
        let mut app = new_app(temp.path());

        app.clipboard_paste();

        assert_eq!(app.message.as_deref(), Some("Clipboard is empty"));
    }

    // ========== Text save tests ==========

    #[test]
    fn test_save_text_file_and_undo() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, "one\n").unwrap();
        let mut app = new_app(temp.path());

        app.open_text_file(path.clone());
        wait_for_text_load(&mut app);

        {
            let state = app.text_file.as_mut().unwrap();
            state.enter_edit_mode();
            state.move_to_line_end();
            state.insert_char('!');
        }
        app.save_text_file();
        wait_for_operation(&mut app);

        assert_eq!(app.message.as_deref(), Some("File saved successfully"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "one!\n");
        assert!(!app.text_file.as_ref().unwrap().is_editing());

        app.undo_last_modification();
        wait_for_operation(&mut app);
        wait_for_text_load(&mut app);

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\n");
        assert_eq!(app.text_file.as_ref().unwrap().lines, vec!["one"]);
    }

    #[test]
    fn test_undo_after_delete_does_not_restore_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "text").unwrap();
        let mut app = new_app(temp.path());

        app.execute_modification(Modification::append_text("!"));
        wait_for_operation(&mut app);
        app.execute_delete();
        wait_for_operation(&mut app);
        assert!(!temp.path().join("a.txt").exists());

        app.undo_last_modification();
        wait_for_operation(&mut app);

        assert!(!temp.path().join("a.txt").exists());
        let message = app.message.clone().unwrap_or_default();
        assert!(message.starts_with("Undo failed. Error restoring a.txt"), "{}", message);
    }

    #[test]
    fn test_cancelled_modification_reports_and_keeps_undo_level() {
        let temp = TempDir::new().unwrap();
        let mut app = new_app(temp.path());

        let (tx, rx) = mpsc::channel();
        let mut progress = OperationProgress::new(FileOperationType::Modify, "Appending text");
        progress.is_active = true;
        progress.receiver = Some(rx);
        app.operation_progress = Some(progress);
        app.dialog = Some(Dialog::new(DialogType::Progress));

        app.cancel_operation();
        let mut snapshot = UndoSnapshot::new("Appending text");
        snapshot.entries.push(UndoEntry {
            path: temp.path().join("a.txt"),
            original: b"x".to_vec(),
        });
        tx.send(ProgressMessage::Modified(snapshot)).unwrap();
        tx.send(ProgressMessage::Completed(1, 0)).unwrap();
        app.tick();

        assert!(app.operation_progress.is_none());
        assert!(app.dialog.is_none());
        assert_eq!(app.message.as_deref(), Some("Appending text cancelled"));
        assert_eq!(app.undo_snapshot.as_ref().map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_quit_refused_while_busy() {
        let temp = TempDir::new().unwrap();
        let mut app = new_app(temp.path());
        let mut progress = OperationProgress::new(FileOperationType::Modify, "Appending text");
        progress.is_active = true;
        app.operation_progress = Some(progress);

        app.request_quit();

        assert!(!app.should_quit);
    }
}

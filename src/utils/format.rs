use std::path::Path;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

/// Lower-cased extension of a file name, empty when there is none
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Type column label: "Folder", "<EXT> File" or "File"
pub fn file_type_label(name: &str, is_directory: bool) -> String {
    if is_directory {
        return "Folder".to_string();
    }
    let ext = extension_of(name);
    if ext.is_empty() {
        "File".to_string()
    } else {
        format!("{} File", ext.to_uppercase())
    }
}

pub fn is_text_file(name: &str, extensions: &[String]) -> bool {
    let ext = extension_of(name);
    !ext.is_empty() && extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Short list of names for dialogs: "a, b, c" or "a, b and 3 more"
pub fn summarize_names(names: &[String]) -> String {
    if names.len() <= 3 {
        names.join(", ")
    } else {
        format!("{} and {} more", names[..2].join(", "), names.len() - 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1048576), "1.0 MB");
        assert_eq!(format_size(1073741824), "1.0 GB");
    }

    #[test]
    fn test_file_type_label() {
        assert_eq!(file_type_label("photos", true), "Folder");
        assert_eq!(file_type_label("notes.txt", false), "TXT File");
        assert_eq!(file_type_label("Data.Json", false), "JSON File");
        assert_eq!(file_type_label("Makefile", false), "File");
        // a directory with a dot is still a folder
        assert_eq!(file_type_label("archive.d", true), "Folder");
    }

    #[test]
    fn test_is_text_file() {
        let exts: Vec<String> = ["txt", "log", "json", "xml", "csv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(is_text_file("a.txt", &exts));
        assert!(is_text_file("SERVER.LOG", &exts));
        assert!(is_text_file("table.csv", &exts));
        assert!(!is_text_file("image.png", &exts));
        assert!(!is_text_file("README", &exts));
        assert!(!is_text_file(".txt", &exts));
    }

    #[test]
    fn test_summarize_names() {
        let names: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(summarize_names(&names), "a, b, c");

        let names: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert_eq!(summarize_names(&names), "a, b and 2 more");
    }
}

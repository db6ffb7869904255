//! Binary-path classification.
//!
//! Polling binary files at the normal interval wastes stats on content that
//! changes rarely and never needs low latency, so classified paths are moved
//! to the slower `binary_interval`.

use std::path::Path;

/// File extensions treated as binary content.
const BINARY_EXTENSIONS: &[&str] = &[
    "3g2", "3gp", "7z", "a", "aac", "aiff", "ape", "apk", "ar", "asf", "avi", "bin", "bmp", "bz2",
    "cab", "class", "deb", "dex", "dll", "dmg", "dng", "doc", "docx", "dylib", "ear", "eot",
    "epub", "exe", "flac", "flv", "gif", "gz", "ico", "iso", "jar", "jpeg", "jpg", "lz", "lzma",
    "lzo", "m4a", "m4v", "mid", "mkv", "mov", "mp3", "mp4", "mpeg", "mpg", "msi", "nes", "o",
    "odp", "ods", "odt", "oga", "ogg", "ogv", "opus", "otf", "pdf", "png", "ppt", "pptx", "psd",
    "rar", "rpm", "rtf", "so", "swf", "tar", "tbz", "tgz", "tif", "tiff", "ttf", "txz", "wav",
    "webm", "webp", "wma", "wmv", "woff", "woff2", "xls", "xlsx", "xpi", "xz", "zip", "zst",
];

/// Whether the path's extension marks it as binary content.
pub fn is_binary_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    BINARY_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_extensions() {
        assert!(is_binary_path(Path::new("/media/video.mp4")));
        assert!(is_binary_path(Path::new("archive.tar")));
        assert!(is_binary_path(Path::new("photo.JPG")));
    }

    #[test]
    fn text_and_extensionless_paths_are_not_binary() {
        assert!(!is_binary_path(Path::new("src/main.rs")));
        assert!(!is_binary_path(Path::new("README")));
        assert!(!is_binary_path(Path::new(".gitignore")));
    }
}

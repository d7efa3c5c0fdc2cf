//! Broad file categories used by `category:` rule patterns.
//!
//! A file's category is decided from its sniffed MIME type when one is
//! available, falling back to the extension.
//!
//! ```
//! use filedispatch::category::{Category, FileMapper};
//!
//! let mapper = FileMapper::default();
//! assert_eq!(mapper.categorize(Some("image/png"), None), Category::Image);
//! assert_eq!(mapper.categorize(None, Some("PDF")), Category::Document);
//! assert_eq!("videos".parse::<Category>(), Ok(Category::Video));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Number of leading bytes read when sniffing a file's content type.
const SNIFF_LEN: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Image,
    Audio,
    Video,
    Document,
    Archive,
    Code,
    Spreadsheet,
    Presentation,
    Font,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Image,
        Category::Audio,
        Category::Video,
        Category::Document,
        Category::Archive,
        Category::Code,
        Category::Spreadsheet,
        Category::Presentation,
        Category::Font,
        Category::Other,
    ];

    /// The plural, lowercase name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Audio => "audio",
            Category::Video => "videos",
            Category::Document => "documents",
            Category::Archive => "archives",
            Category::Code => "code",
            Category::Spreadsheet => "spreadsheets",
            Category::Presentation => "presentations",
            Category::Font => "fonts",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a configuration names a category that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the plural name as well as the singular form (`image`, `document`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| {
                let name = category.name();
                name == wanted || name.strip_suffix('s') == Some(wanted.as_str())
            })
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

const MIME_TABLE: &[(&str, Category)] = &[
    ("image/png", Category::Image),
    ("image/jpeg", Category::Image),
    ("image/gif", Category::Image),
    ("image/webp", Category::Image),
    ("image/bmp", Category::Image),
    ("image/tiff", Category::Image),
    ("image/heif", Category::Image),
    ("image/svg+xml", Category::Image),
    ("audio/mpeg", Category::Audio),
    ("audio/x-wav", Category::Audio),
    ("audio/ogg", Category::Audio),
    ("audio/x-flac", Category::Audio),
    ("audio/aac", Category::Audio),
    ("audio/m4a", Category::Audio),
    ("video/mp4", Category::Video),
    ("video/quicktime", Category::Video),
    ("video/x-msvideo", Category::Video),
    ("video/x-matroska", Category::Video),
    ("video/webm", Category::Video),
    ("video/x-flv", Category::Video),
    ("application/pdf", Category::Document),
    ("application/rtf", Category::Document),
    ("application/msword", Category::Document),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Category::Document,
    ),
    ("application/vnd.oasis.opendocument.text", Category::Document),
    ("application/zip", Category::Archive),
    ("application/vnd.rar", Category::Archive),
    ("application/x-7z-compressed", Category::Archive),
    ("application/x-tar", Category::Archive),
    ("application/gzip", Category::Archive),
    ("application/x-bzip2", Category::Archive),
    ("application/x-xz", Category::Archive),
    ("application/vnd.ms-excel", Category::Spreadsheet),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Category::Spreadsheet,
    ),
    ("application/vnd.ms-powerpoint", Category::Presentation),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Category::Presentation,
    ),
    ("font/ttf", Category::Font),
    ("font/otf", Category::Font),
    ("font/woff", Category::Font),
    ("font/woff2", Category::Font),
];

const EXTENSION_TABLE: &[(&[&str], Category)] = &[
    (
        &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tif", "tiff", "ico", "heic"],
        Category::Image,
    ),
    (&["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"], Category::Audio),
    (&["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"], Category::Video),
    (
        &["pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt"],
        Category::Document,
    ),
    (&["zip", "rar", "7z", "tar", "gz", "bz2", "xz"], Category::Archive),
    (
        &[
            "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "json", "xml",
            "yaml", "yml", "toml",
        ],
        Category::Code,
    ),
    (&["csv", "xls", "xlsx", "ods"], Category::Spreadsheet),
    (&["ppt", "pptx", "odp"], Category::Presentation),
    (&["ttf", "otf", "woff", "woff2"], Category::Font),
];

/// Maps MIME types and extensions to categories. Lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct FileMapper {
    by_mime: HashMap<String, Category>,
    by_extension: HashMap<String, Category>,
}

impl FileMapper {
    pub fn new() -> Self {
        let by_mime = MIME_TABLE
            .iter()
            .map(|(mime, category)| (mime.to_string(), *category))
            .collect();
        let by_extension = EXTENSION_TABLE
            .iter()
            .flat_map(|(extensions, category)| {
                extensions.iter().map(|ext| (ext.to_string(), *category))
            })
            .collect();
        Self {
            by_mime,
            by_extension,
        }
    }

    /// Picks a category: sniffed MIME type first, extension second, `Other` last.
    pub fn categorize(&self, mime: Option<&str>, extension: Option<&str>) -> Category {
        mime.and_then(|m| self.by_mime.get(&m.to_ascii_lowercase()))
            .or_else(|| extension.and_then(|e| self.by_extension.get(&e.to_ascii_lowercase())))
            .copied()
            .unwrap_or(Category::Other)
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Sniffs a file's MIME type from its first few kilobytes.
///
/// Returns `None` when the file cannot be read or the content is not recognized.
pub fn sniff_mime(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut head).ok()?;
    infer::get(&head).map(|kind| kind.mime_type().to_string())
}

use chrono::{DateTime, Utc};
use clerk_core::UNKNOWN_RECIPIENT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const OTHERS: &str = "Others";

/// Declared file type, derived from the extension. Drives content sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Docx,
    Epub,
    Text,
    Binary,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "epub" => Self::Epub,
            "txt" | "md" | "csv" | "log" | "json" | "py" | "rs" | "html" | "htm" | "css"
            | "js" => Self::Text,
            _ => Self::Binary,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Binary)
    }

    pub fn has_text(&self) -> bool {
        !matches!(self, Self::Binary)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Epub => "epub",
            Self::Text => "text",
            Self::Binary => "binary",
        })
    }
}

/// A destination bucket. Names are kept verbatim; they double as directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_string())
    }

    pub fn others() -> Self {
        Self::new(OTHERS)
    }

    pub fn is_others(&self) -> bool {
        self.0 == OTHERS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One file awaiting classification.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub kind: FileKind,
    /// Text already read by the caller; skips sampling when present.
    pub sample: Option<String>,
}

impl FileTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = FileKind::from_path(&path);
        Self {
            path,
            kind,
            sample: None,
        }
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Lowercased file name without its extension.
    pub fn base_name(&self) -> String {
        self.filename()
            .map(|name| clerk_core::split_name(name).0.to_lowercase())
            .unwrap_or_default()
    }
}

/// Pipeline stage that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    FilenamePattern,
    MediaType,
    Content,
    Model,
    Fallback,
}

impl fmt::Display for DecidedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FilenamePattern => "filename pattern",
            Self::MediaType => "media type",
            Self::Content => "content",
            Self::Model => "model",
            Self::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub recipient: String,
    pub decided_by: DecidedBy,
}

impl ClassificationResult {
    pub fn fallback() -> Self {
        Self {
            category: Category::others(),
            recipient: UNKNOWN_RECIPIENT.to_string(),
            decided_by: DecidedBy::Fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Batch run.
    Move,
    /// Watch event.
    Create,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Create => "create",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "move" => Some(Self::Move),
            "create" => Some(Self::Create),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit entry for one completed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub filename: String,
    pub category: Category,
    pub new_filename: String,
    pub recipient: String,
}

impl ActionRecord {
    pub fn new(
        action: ActionKind,
        filename: impl Into<String>,
        category: Category,
        new_filename: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            filename: filename.into(),
            category,
            new_filename: new_filename.into(),
            recipient: recipient.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_extension("PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_extension("docx"), FileKind::Docx);
        assert_eq!(FileKind::from_extension("py"), FileKind::Text);
        assert_eq!(FileKind::from_extension("png"), FileKind::Binary);
        assert_eq!(FileKind::from_path(Path::new("/in/Makefile")), FileKind::Binary);
    }

    #[test]
    fn task_base_name_is_lowercased_stem() {
        let task = FileTask::new("/inbox/Quarterly_REPORT.final.txt");
        assert_eq!(task.base_name(), "quarterly_report.final");
        assert_eq!(task.kind, FileKind::Text);
    }

    #[test]
    fn category_keeps_case() {
        let category = Category::new(" Reports ");
        assert_eq!(category.as_str(), "Reports");
        assert!(!category.is_others());
        assert!(Category::from("Others").is_others());
    }

    #[test]
    fn action_kind_parse() {
        assert_eq!(ActionKind::parse("move"), Some(ActionKind::Move));
        assert_eq!(ActionKind::parse("create"), Some(ActionKind::Create));
        assert_eq!(ActionKind::parse("delete"), None);
    }

    #[test]
    fn fallback_result() {
        let result = ClassificationResult::fallback();
        assert_eq!(result.category, Category::others());
        assert_eq!(result.recipient, "Unknown");
        assert_eq!(result.decided_by, DecidedBy::Fallback);
    }
}

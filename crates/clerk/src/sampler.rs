//! Bounded text samples for content-based classification.
//!
//! Only the leading pages, paragraphs or bytes of a document are read, so huge or
//! malformed files cost the same as small ones.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::config::SampleLimits;
use crate::types::FileKind;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse PDF: {0}")]
    Pdf(String),
    #[error("failed to parse DOCX: {0}")]
    Docx(String),
    #[error("failed to parse EPUB: {0}")]
    Epub(String),
}

pub trait Sampler: Send + Sync {
    fn try_sample(&self, path: &Path, kind: FileKind) -> Result<String, ExtractError>;

    /// Never fails: extraction errors are logged and yield an empty sample.
    fn sample(&self, path: &Path, kind: FileKind) -> String {
        self.try_sample(path, kind).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "content extraction failed");
            String::new()
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSampler {
    limits: SampleLimits,
}

impl ContentSampler {
    pub fn new(limits: SampleLimits) -> Self {
        Self { limits }
    }

    fn pdf(&self, path: &Path) -> Result<String, ExtractError> {
        let doc = lopdf::Document::load(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        let pages: Vec<u32> = doc
            .get_pages()
            .keys()
            .copied()
            .take(self.limits.max_pages)
            .collect();

        if pages.is_empty() {
            return Ok(String::new());
        }

        doc.extract_text(&pages)
            .map_err(|e| ExtractError::Pdf(e.to_string()))
    }

    fn docx(&self, path: &Path) -> Result<String, ExtractError> {
        use docx_rs::{DocumentChild, ParagraphChild, RunChild};

        let bytes = read_prefix(path, MAX_CONTAINER_BYTES)?;
        let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractError::Docx(e.to_string()))?;

        let paragraphs = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(para) => Some(para),
                _ => None,
            })
            .take(self.limits.max_paragraphs)
            .map(|para| {
                para.children
                    .iter()
                    .filter_map(|pc| match pc {
                        ParagraphChild::Run(run) => Some(run),
                        _ => None,
                    })
                    .flat_map(|run| run.children.iter())
                    .filter_map(|rc| match rc {
                        RunChild::Text(t) => Some(t.text.as_str()),
                        _ => None,
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>();

        Ok(paragraphs.join("\n"))
    }

    fn epub(&self, path: &Path) -> Result<String, ExtractError> {
        let mut doc = epub::doc::EpubDoc::new(path).map_err(|e| ExtractError::Epub(e.to_string()))?;
        let mut sections = Vec::new();

        while sections.len() < self.limits.max_pages {
            if let Some((chapter, _mime)) = doc.get_current_str() {
                let plain = strip_html(&chapter);
                if !plain.is_empty() {
                    sections.push(plain);
                }
            }
            if !doc.go_next() {
                break;
            }
        }

        Ok(sections.join("\n"))
    }

    fn text(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = read_prefix(path, self.limits.max_bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Sampler for ContentSampler {
    fn try_sample(&self, path: &Path, kind: FileKind) -> Result<String, ExtractError> {
        let raw = match kind {
            FileKind::Pdf => self.pdf(path)?,
            FileKind::Docx => self.docx(path)?,
            FileKind::Epub => self.epub(path)?,
            FileKind::Text => self.text(path)?,
            FileKind::Binary => String::new(),
        };

        let normalized = normalize_text(&raw);
        Ok(truncate_to_char_boundary(&normalized, self.limits.max_bytes).to_string())
    }
}

/// DOCX is a zip container; refuse to buffer more than this.
const MAX_CONTAINER_BYTES: usize = 32 * 1024 * 1024;

fn read_prefix(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)?.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn normalize_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut last_was_space = true;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                if c.is_whitespace() {
                    if !last_was_space {
                        result.push(' ');
                        last_was_space = true;
                    }
                } else {
                    result.push(c);
                    last_was_space = false;
                }
            }
            _ => {}
        }
    }

    result.trim().to_string()
}

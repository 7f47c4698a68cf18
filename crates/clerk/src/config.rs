use clerk_core::MediaKind;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::Category;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no categories configured")]
    NoCategories,
    #[error("no patterns configured")]
    NoPatterns,
    #[error("no category directories configured")]
    NoDirectories,
    #[error("{context} refers to unknown category '{category}'")]
    UnknownCategory { context: &'static str, category: String },
    #[error("invalid pattern for '{category}': {source}")]
    InvalidPattern {
        category: String,
        #[source]
        source: regex::Error,
    },
    #[error("directory '{dir}' for '{category}' must be a single plain name")]
    InvalidDirectory { category: String, dir: String },
    #[error("directory '{dir}' is shared by more than one category")]
    SharedDirectory { dir: String },
    #[error("batch interval must be at least one second")]
    ZeroInterval,
}

/// On-disk configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub categories: Vec<Category>,
    pub patterns: Vec<PatternRule>,
    pub directories: BTreeMap<Category, String>,
    #[serde(default = "default_content_categories")]
    pub content_categories: Vec<Category>,
    #[serde(default = "default_content_keywords")]
    pub content_keywords: Vec<KeywordRule>,
    #[serde(default)]
    pub limits: SampleLimits,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default = "default_audit_db")]
    pub audit_db: PathBuf,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub resolver_cap: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub category: Category,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: Category,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleLimits {
    pub max_pages: usize,
    pub max_paragraphs: usize,
    pub max_bytes: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            max_pages: 2,
            max_paragraphs: 10,
            max_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub level: i32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub root: Option<PathBuf>,
    pub settle_ms: u64,
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: None,
            settle_ms: 500,
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub interval_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let categories: Vec<Category> = ["Reports", "Assignments", "Images", "Audio", "Video", "Others"]
            .into_iter()
            .map(Category::new)
            .collect();

        let directories = categories
            .iter()
            .map(|c| (c.clone(), c.as_str().to_string()))
            .collect();

        Self {
            categories,
            patterns: vec![
                PatternRule {
                    category: Category::new("Reports"),
                    pattern: r"report|summary|minutes".to_string(),
                },
                PatternRule {
                    category: Category::new("Assignments"),
                    pattern: r"assignment|homework|exercise".to_string(),
                },
            ],
            directories,
            content_categories: default_content_categories(),
            content_keywords: default_content_keywords(),
            limits: SampleLimits::default(),
            archive: ArchiveConfig::default(),
            watch: WatchConfig::default(),
            batch: BatchConfig::default(),
            audit_db: default_audit_db(),
            model_path: None,
            log_file: None,
            resolver_cap: None,
        }
    }
}

fn default_content_categories() -> Vec<Category> {
    vec![Category::new("Reports"), Category::new("Assignments")]
}

fn default_content_keywords() -> Vec<KeywordRule> {
    vec![
        KeywordRule {
            category: Category::new("Reports"),
            words: vec!["analysis".to_string()],
        },
        KeywordRule {
            category: Category::new("Assignments"),
            words: vec!["assignment".to_string(), "homework".to_string()],
        },
    ]
}

fn default_audit_db() -> PathBuf {
    PathBuf::from("file_organizer.db")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(Into::into)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(Into::into)
    }

    /// Check every cross-reference and compile the patterns.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        if self.patterns.is_empty() {
            return Err(ConfigError::NoPatterns);
        }
        if self.directories.is_empty() {
            return Err(ConfigError::NoDirectories);
        }
        if self.batch.interval_secs == Some(0) {
            return Err(ConfigError::ZeroInterval);
        }

        let mut categories = self.categories.clone();
        if !categories.iter().any(Category::is_others) {
            categories.push(Category::others());
        }

        let known = |context: &'static str, category: &Category| {
            categories
                .contains(category)
                .then_some(())
                .ok_or_else(|| ConfigError::UnknownCategory {
                    context,
                    category: category.to_string(),
                })
        };

        let filename_rules = self
            .patterns
            .iter()
            .map(|rule| {
                known("pattern", &rule.category)?;
                compile(&rule.category, &rule.pattern).map(|re| (rule.category.clone(), re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.content_categories
            .iter()
            .try_for_each(|c| known("content category", c))?;

        let keyword_rules = self
            .content_keywords
            .iter()
            .map(|rule| {
                known("content keyword", &rule.category)?;
                let words = rule.words.iter().map(|w| w.to_lowercase()).collect();
                Ok((rule.category.clone(), words))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut directories = BTreeMap::new();
        for category in &categories {
            let dir = self
                .directories
                .get(category)
                .cloned()
                .unwrap_or_else(|| category.as_str().to_string());
            directories.insert(category.clone(), dir);
        }
        for (category, dir) in &self.directories {
            known("directory", category)?;
            if !is_plain_name(dir) {
                return Err(ConfigError::InvalidDirectory {
                    category: category.to_string(),
                    dir: dir.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        if let Some(dir) = directories.values().find(|d| !seen.insert(d.as_str())) {
            return Err(ConfigError::SharedDirectory { dir: dir.clone() });
        }

        Ok(Settings {
            categories,
            filename_rules,
            content_categories: self.content_categories,
            keyword_rules,
            directories,
            limits: self.limits,
            archive: self.archive,
            watch: self.watch,
            batch: self.batch,
            audit_db: self.audit_db,
            model_path: self.model_path,
            log_file: self.log_file,
            resolver_cap: self.resolver_cap,
        })
    }
}

fn compile(category: &Category, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            category: category.to_string(),
            source,
        })
}

fn is_plain_name(dir: &str) -> bool {
    !dir.is_empty()
        && dir != "."
        && dir != ".."
        && !dir.contains(['/', '\\'])
}

/// Validated, compiled configuration shared by the engine.
#[derive(Debug, Clone)]
pub struct Settings {
    pub categories: Vec<Category>,
    pub filename_rules: Vec<(Category, Regex)>,
    pub content_categories: Vec<Category>,
    pub keyword_rules: Vec<(Category, Vec<String>)>,
    pub directories: BTreeMap<Category, String>,
    pub limits: SampleLimits,
    pub archive: ArchiveConfig,
    pub watch: WatchConfig,
    pub batch: BatchConfig,
    pub audit_db: PathBuf,
    pub model_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub resolver_cap: Option<u64>,
}

impl Settings {
    pub fn contains(&self, category: &Category) -> bool {
        self.categories.contains(category)
    }

    /// Accept `category` only if it is configured.
    pub fn known(&self, category: Category) -> Option<Category> {
        self.contains(&category).then_some(category)
    }

    pub fn media_category(&self, kind: MediaKind) -> Option<Category> {
        let name = match kind {
            MediaKind::Image => "Images",
            MediaKind::Audio => "Audio",
            MediaKind::Video => "Video",
        };
        self.known(Category::new(name))
    }

    pub fn filename_pattern(&self, category: &Category) -> Option<&Regex> {
        self.filename_rules
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, re)| re)
    }

    pub fn directory_name<'a>(&'a self, category: &'a Category) -> &'a str {
        self.directories
            .get(category)
            .map(String::as_str)
            .unwrap_or(category.as_str())
    }

    pub fn category_dir(&self, root: &Path, category: &Category) -> PathBuf {
        root.join(self.directory_name(category))
    }

    /// Category directory names that are archived at the end of a batch.
    pub fn archivable_dirs(&self) -> impl Iterator<Item = &str> {
        self.directories
            .iter()
            .filter(|(c, _)| !c.is_others())
            .map(|(_, d)| d.as_str())
    }

    pub fn is_category_dir_name(&self, name: &str) -> bool {
        self.directories.values().any(|d| d == name)
    }
}

use clerk_core::{recipient_or_unknown, sniff_file, UNKNOWN_RECIPIENT};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::model::TextModel;
use crate::sampler::{ContentSampler, Sampler};
use crate::types::{Category, ClassificationResult, DecidedBy, FileTask};

/// Per-file scratch state shared by the stages; the text sample is read at most once.
pub struct TaskContext<'a> {
    pub task: &'a FileTask,
    sampler: &'a dyn Sampler,
    sample: Option<String>,
}

impl<'a> TaskContext<'a> {
    fn new(task: &'a FileTask, sampler: &'a dyn Sampler) -> Self {
        Self {
            task,
            sampler,
            sample: task.sample.clone(),
        }
    }

    pub fn sample(&mut self) -> &str {
        let (task, sampler) = (self.task, self.sampler);
        self.sample
            .get_or_insert_with(|| sampler.sample(&task.path, task.kind))
    }
}

/// One link in the fallback chain. `Ok(None)` means "no decision, ask the next stage".
pub trait Strategy: Send + Sync {
    fn stage(&self) -> DecidedBy;
    fn try_classify(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<Option<Category>>;
}

pub struct FilenamePattern {
    settings: Arc<Settings>,
}

impl Strategy for FilenamePattern {
    fn stage(&self) -> DecidedBy {
        DecidedBy::FilenamePattern
    }

    fn try_classify(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<Option<Category>> {
        let base = ctx.task.base_name();
        Ok(self
            .settings
            .filename_rules
            .iter()
            .find(|(_, re)| re.is_match(&base))
            .map(|(category, _)| category.clone()))
    }
}

pub struct MediaType {
    settings: Arc<Settings>,
}

impl Strategy for MediaType {
    fn stage(&self) -> DecidedBy {
        DecidedBy::MediaType
    }

    fn try_classify(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<Option<Category>> {
        Ok(sniff_file(&ctx.task.path)?.and_then(|sniffed| {
            debug!(mime = sniffed.mime, "sniffed media type");
            self.settings.media_category(sniffed.kind)
        }))
    }
}

pub struct ContentHeuristic {
    settings: Arc<Settings>,
}

impl ContentHeuristic {
    fn by_pattern(&self, text: &str) -> Option<Category> {
        self.settings
            .content_categories
            .iter()
            .find(|category| {
                self.settings
                    .filename_pattern(category)
                    .is_some_and(|re| re.is_match(text))
            })
            .cloned()
    }

    fn by_keyword(&self, text: &str) -> Option<Category> {
        let lowered = text.to_lowercase();
        self.settings
            .keyword_rules
            .iter()
            .find(|(_, words)| words.iter().any(|w| lowered.contains(w.as_str())))
            .map(|(category, _)| category.clone())
    }
}

impl Strategy for ContentHeuristic {
    fn stage(&self) -> DecidedBy {
        DecidedBy::Content
    }

    fn try_classify(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<Option<Category>> {
        let text = ctx.sample();
        if text.is_empty() {
            return Ok(None);
        }
        // Lexical keywords override the pattern match within this stage.
        Ok(self.by_keyword(text).or_else(|| self.by_pattern(text)))
    }
}

pub struct ModelFallback {
    settings: Arc<Settings>,
    model: Option<Arc<dyn TextModel>>,
}

impl Strategy for ModelFallback {
    fn stage(&self) -> DecidedBy {
        DecidedBy::Model
    }

    fn try_classify(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<Option<Category>> {
        let Some(model) = &self.model else {
            return Ok(None);
        };
        let text = ctx.sample();
        if text.is_empty() {
            return Ok(None);
        }

        let predicted = Category::new(model.predict(text)?);
        let known = self.settings.known(predicted.clone());
        if known.is_none() {
            warn!(category = %predicted, "model predicted an unconfigured category");
        }
        Ok(known)
    }
}

/// Ordered strategy chain; the first stage to decide wins.
pub struct Pipeline {
    strategies: Vec<Box<dyn Strategy>>,
    sampler: Box<dyn Sampler>,
}

impl Pipeline {
    pub fn new(settings: Arc<Settings>, model: Option<Arc<dyn TextModel>>) -> Self {
        let sampler = ContentSampler::new(settings.limits);
        Self::with_sampler(settings, model, Box::new(sampler))
    }

    pub fn with_sampler(
        settings: Arc<Settings>,
        model: Option<Arc<dyn TextModel>>,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(FilenamePattern {
                settings: Arc::clone(&settings),
            }),
            Box::new(MediaType {
                settings: Arc::clone(&settings),
            }),
            Box::new(ContentHeuristic {
                settings: Arc::clone(&settings),
            }),
            Box::new(ModelFallback { settings, model }),
        ];
        Self {
            strategies,
            sampler,
        }
    }

    pub fn stages(&self) -> Vec<DecidedBy> {
        self.strategies.iter().map(|s| s.stage()).collect()
    }

    pub fn classify(&self, task: &FileTask) -> ClassificationResult {
        let mut ctx = TaskContext::new(task, self.sampler.as_ref());

        let decision = self.strategies.iter().find_map(|strategy| {
            match strategy.try_classify(&mut ctx) {
                Ok(Some(category)) => Some((category, strategy.stage())),
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        path = %task.path.display(),
                        stage = %strategy.stage(),
                        error = %e,
                        "classification stage failed"
                    );
                    None
                }
            }
        });

        let (category, decided_by) =
            decision.unwrap_or_else(|| (Category::others(), DecidedBy::Fallback));

        let recipient = if task.kind.has_text() {
            recipient_or_unknown(ctx.sample())
        } else {
            UNKNOWN_RECIPIENT.to_string()
        };

        debug!(
            path = %task.path.display(),
            category = %category,
            decided_by = %decided_by,
            "classified"
        );

        ClassificationResult {
            category,
            recipient,
            decided_by,
        }
    }
}

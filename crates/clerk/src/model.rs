//! Statistical fallback classifier.
//!
//! Models are trained offline; this side only loads the exported scores and predicts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub trait TextModel: Send + Sync {
    fn predict(&self, text: &str) -> anyhow::Result<String>;
}

/// Multinomial naive Bayes scores exported by the trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    pub classes: Vec<ClassScores>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassScores {
    pub label: String,
    pub log_prior: f64,
    /// Log likelihood of each vocabulary token given this class.
    pub token_log_prob: HashMap<String, f64>,
    /// Log likelihood used for tokens outside the vocabulary.
    pub unseen_log_prob: f64,
}

impl ClassScores {
    fn score<'a>(&self, tokens: impl Iterator<Item = &'a str>) -> f64 {
        tokens.fold(self.log_prior, |acc, token| {
            acc + self
                .token_log_prob
                .get(token)
                .copied()
                .unwrap_or(self.unseen_log_prob)
        })
    }
}

impl NaiveBayesModel {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&content)?;
        if model.classes.is_empty() {
            anyhow::bail!("model {} has no classes", path.display());
        }
        Ok(model)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

impl TextModel for NaiveBayesModel {
    fn predict(&self, text: &str) -> anyhow::Result<String> {
        let tokens = tokenize(text);

        self.classes
            .iter()
            .map(|class| (class, class.score(tokens.iter().map(String::as_str))))
            .filter(|(_, score)| score.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(class, _)| class.label.clone())
            .ok_or_else(|| anyhow::anyhow!("no class produced a finite score"))
    }
}

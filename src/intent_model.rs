//! Nearest-neighbour intent classification over labelled examples.
//!
//! Examples live in a JSON-lines file, one `{"text": ..., "label": ...}`
//! per line, with labels as accepted by [`Intent::from_str`]. Their
//! embeddings are cached in a JSON index next to the other derived state.
//! The index is rebuilt when it is missing, older than the examples file,
//! or was built with a different model.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use query_harness_core::intent::{Classification, Classifier, Intent};
use query_harness_core::ranking::dot;

use crate::config::IntentConfig;
use crate::embedding::{embed_normalized, embed_query, Embedder};

#[derive(Debug, Deserialize)]
struct Example {
    text: String,
    label: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexedExample {
    text: String,
    label: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IntentIndex {
    model: String,
    examples: Vec<IndexedExample>,
}

pub struct SemanticClassifier {
    embedder: Arc<dyn Embedder>,
    examples: Vec<(Intent, Vec<f32>)>,
    threshold: f32,
}

impl SemanticClassifier {
    /// Load the example index, rebuilding it first if stale.
    pub async fn load(config: &IntentConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index = match read_fresh_index(config, embedder.model_name())? {
            Some(index) => index,
            None => build_index(config, embedder.as_ref()).await?,
        };

        let mut examples = Vec::with_capacity(index.examples.len());
        for example in index.examples {
            match Intent::from_str(&example.label) {
                Ok(intent) => examples.push((intent, example.embedding)),
                Err(e) => tracing::warn!(text = %example.text, "skipping intent example: {e}"),
            }
        }
        if examples.is_empty() {
            bail!(
                "no usable intent examples in {}",
                config.examples_path.display()
            );
        }

        Ok(Self {
            embedder,
            examples,
            threshold: config.threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Best-matching intent and its similarity, regardless of threshold.
    fn nearest(&self, query: &[f32]) -> Option<(Intent, f32)> {
        self.examples
            .iter()
            .map(|(intent, vec)| (*intent, dot(vec, query)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[async_trait]
impl Classifier for SemanticClassifier {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn classify(&self, query: &str) -> Result<Option<Classification>> {
        let vec = match embed_query(self.embedder.as_ref(), &query.to_lowercase()).await {
            Ok(vec) => vec,
            Err(e) => {
                tracing::warn!("semantic intent unavailable: {e:#}");
                return Ok(None);
            }
        };

        let Some((intent, similarity)) = self.nearest(&vec) else {
            return Ok(None);
        };
        tracing::debug!(%intent, similarity, threshold = self.threshold, "nearest intent example");
        if similarity < self.threshold {
            return Ok(None);
        }
        Ok(Some(Classification {
            intent,
            confidence: similarity,
            source: self.name().to_string(),
        }))
    }
}

fn read_fresh_index(config: &IntentConfig, model: &str) -> Result<Option<IntentIndex>> {
    let index_path = &config.index_path;
    if !index_path.exists() {
        return Ok(None);
    }
    // Without an examples file the existing index is all there is.
    if config.examples_path.exists()
        && modified(&config.examples_path)? > modified(index_path)?
    {
        tracing::debug!("intent examples changed, rebuilding index");
        return Ok(None);
    }

    let content = std::fs::read_to_string(index_path)
        .with_context(|| format!("Failed to read intent index: {}", index_path.display()))?;
    let index: IntentIndex = match serde_json::from_str(&content) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("intent index unreadable, rebuilding: {e}");
            return Ok(None);
        }
    };
    if index.model != model {
        tracing::debug!(built_with = %index.model, model, "intent index model changed, rebuilding");
        return Ok(None);
    }
    Ok(Some(index))
}

async fn build_index(config: &IntentConfig, embedder: &dyn Embedder) -> Result<IntentIndex> {
    let examples = read_examples(&config.examples_path)?;
    let texts: Vec<String> = examples.iter().map(|e| e.text.clone()).collect();
    let embeddings = embed_normalized(embedder, &texts).await?;

    let index = IntentIndex {
        model: embedder.model_name().to_string(),
        examples: examples
            .into_iter()
            .zip(embeddings)
            .map(|(example, embedding)| IndexedExample {
                text: example.text,
                label: example.label,
                embedding,
            })
            .collect(),
    };

    if let Some(parent) = config.index_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&config.index_path, serde_json::to_vec(&index)?).with_context(|| {
        format!(
            "Failed to write intent index: {}",
            config.index_path.display()
        )
    })?;
    tracing::debug!(examples = index.examples.len(), "built intent index");
    Ok(index)
}

fn read_examples(path: &Path) -> Result<Vec<Example>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read intent examples: {}", path.display()))?;

    let mut examples = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut example: Example = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid example", path.display(), lineno + 1))?;
        example.text = example.text.to_lowercase();
        examples.push(example);
    }
    Ok(examples)
}

fn modified(path: &Path) -> Result<std::time::SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Maps text onto three axes by keyword, counting calls.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        if t.contains("how many") { 1.0 } else { 0.0 },
                        if t.contains("average") { 1.0 } else { 0.0 },
                        if t.contains("list") { 1.0 } else { 0.0 },
                    ]
                })
                .collect())
        }
    }

    fn setup(dir: &TempDir) -> IntentConfig {
        let examples = dir.path().join("examples.jsonl");
        std::fs::write(
            &examples,
            concat!(
                "{\"text\": \"How many people work here\", \"label\": \"count\"}\n",
                "\n",
                "{\"text\": \"average pay across teams\", \"label\": \"avg_by_dept\"}\n",
                "{\"text\": \"list everyone\", \"label\": \"select\"}\n",
            ),
        )
        .unwrap();
        IntentConfig {
            examples_path: examples,
            index_path: dir.path().join("derived/intent_index.json"),
            threshold: 0.55,
        }
    }

    #[tokio::test]
    async fn test_classifies_above_threshold() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });
        let classifier = SemanticClassifier::load(&config, embedder).await.unwrap();
        assert_eq!(classifier.len(), 3);

        let answer = classifier
            .classify("How many engineers do we have")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answer.intent, Intent::Count);
        assert_eq!(answer.source, "semantic");
        assert!((answer.confidence - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_below_threshold_is_none() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });
        let classifier = SemanticClassifier::load(&config, embedder).await.unwrap();
        assert!(classifier.classify("tell me a joke").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_is_reused_until_examples_change() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });

        SemanticClassifier::load(&config, embedder.clone())
            .await
            .unwrap();
        assert!(config.index_path.exists());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        SemanticClassifier::load(&config, embedder.clone())
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        // Push the examples file's mtime past the index.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .append(true)
            .open(&config.examples_path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        SemanticClassifier::load(&config, embedder.clone())
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_existing_index_survives_removed_examples() {
        let dir = TempDir::new().unwrap();
        let config = setup(&dir);
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });
        SemanticClassifier::load(&config, embedder.clone())
            .await
            .unwrap();
        std::fs::remove_file(&config.examples_path).unwrap();

        let classifier = SemanticClassifier::load(&config, embedder.clone())
            .await
            .unwrap();
        assert_eq!(classifier.len(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_examples_file_errors() {
        let dir = TempDir::new().unwrap();
        let config = IntentConfig {
            examples_path: dir.path().join("nope.jsonl"),
            index_path: dir.path().join("index.json"),
            threshold: 0.55,
        };
        let embedder = Arc::new(KeywordEmbedder {
            calls: AtomicUsize::new(0),
        });
        assert!(SemanticClassifier::load(&config, embedder).await.is_err());
    }
}

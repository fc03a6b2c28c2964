//! Integration tests for the question answering pipeline
//!
//! These tests drive the QueryEngine end to end with in-process providers:
//! - retrieval, budgeting and prompt assembly
//! - caching across all three tiers
//! - failure isolation between providers
//! - index refresh policies, concurrency and cancellation

use anyhow::Result;
use async_trait::async_trait;
use ragdoc_context::{ContextBudgeter, TRUNCATION_MARKER};
use ragdoc_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use ragdoc_retriever::RetrieverError;
use ragdoc_retriever::generation::{CompletionError, CompletionProvider};
use ragdoc_retriever::retrieval::{
    EngineSettings, IndexRefresh, IndexStrategy, NO_RELEVANT_INFORMATION, QueryEngine, cache_key,
};
use ragdoc_retriever::storage::{DocumentStore, MemoryStore, NewDocument, SqliteStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

const VOCABULARY: [&str; 8] = [
    "jedi", "story", "luke", "han", "falcon", "star", "princess", "yoda",
];

/// Bag-of-keywords embedder with a constant bias component.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn embed(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; VOCABULARY.len() + 1];
        v[VOCABULARY.len()] = 0.1;
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            let stem = word.strip_suffix('s').unwrap_or(&word);
            if let Some(i) = VOCABULARY.iter().position(|k| *k == stem) {
                v[i] += 1.0;
            }
        }
        v
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_text(&self, text: &str) -> ragdoc_embed::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> ragdoc_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| Self::embed(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        Some(VOCABULARY.len() + 1)
    }

    fn provider_name(&self) -> &str {
        "keyword"
    }
}

struct UnreachableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnreachableEmbedder {
    async fn embed_text(&self, _text: &str) -> ragdoc_embed::Result<Vec<f32>> {
        Err(EmbedError::Provider {
            status: 502,
            body: "bad gateway".to_string(),
        })
    }

    async fn embed_texts(&self, _texts: &[String]) -> ragdoc_embed::Result<EmbeddingResult> {
        Err(EmbedError::malformed("unreachable"))
    }

    fn embedding_dimension(&self) -> Option<usize> {
        None
    }

    fn provider_name(&self) -> &str {
        "unreachable"
    }
}

/// Completion provider that records prompts and replays scripted results.
struct ScriptedCompleter {
    default_answer: String,
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedCompleter {
    fn answering(answer: &str) -> Self {
        Self {
            default_answer: answer.to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn then(self, result: Result<String, CompletionError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_answer.clone()))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

struct Harness {
    engine: Arc<QueryEngine>,
    store: Arc<MemoryStore>,
    embedder: Arc<KeywordEmbedder>,
    completer: Arc<ScriptedCompleter>,
}

fn harness_with(completer: ScriptedCompleter, settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(KeywordEmbedder::default());
    let completer = Arc::new(completer);
    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        embedder.clone(),
        completer.clone(),
        settings,
    ));
    Harness {
        engine,
        store,
        embedder,
        completer,
    }
}

fn harness(answer: &str) -> Harness {
    harness_with(ScriptedCompleter::answering(answer), EngineSettings::default())
}

fn jedi_story() -> String {
    let filler = ["young", "knights", "learn", "the", "ways", "of", "the", "force"];
    let mut words = vec![
        "The", "Rise", "of", "the", "Jedis", "-", "a", "story", "about",
    ];
    words.extend(filler.iter().cycle().take(191));
    words.join(" ")
}

fn words(n: usize, word: &str) -> String {
    vec![word; n].join(" ")
}

#[tokio::test]
async fn test_jedi_story_end_to_end() -> Result<()> {
    let h = harness("It is about the rise of the Jedi.");
    let story = jedi_story();
    assert_eq!(story.split_whitespace().count(), 200);

    h.engine.ingest(&story, None).await?;
    let answer = h.engine.query("What is the story about?").await?;
    assert_eq!(answer, "It is about the rise of the Jedi.");

    // one passage, well under the 2766-word budget, so not truncated
    let prompt = h.completer.last_prompt();
    assert!(prompt.contains(&format!("Passage 1: {story}\n\nQuestion:")));
    assert!(!prompt.contains("Passage 2:"));
    assert!(prompt.contains("Question: What is the story about?"));

    let again = h.engine.query("What is the story about?").await?;
    assert_eq!(again, answer);
    assert_eq!(h.completer.calls(), 1);

    let stats = h.engine.stats();
    assert_eq!(stats.indexed_documents, 1);
    assert_eq!(stats.answer_cache.hits, 1);
    Ok(())
}

#[tokio::test]
async fn test_cache_key_normalization_across_tiers() -> Result<()> {
    let h = harness("Luke is a Jedi.");
    h.engine.ingest("Luke Skywalker is a Jedi.", None).await?;

    h.engine.query("Who is Luke?").await?;
    let key = cache_key("  WHO is luke?\t");
    assert!(h.engine.cache().embeddings.get(&key).is_some());
    assert!(h.engine.cache().search.get(&key).is_some());
    assert_eq!(
        h.engine.cache().answers.get(&key).as_deref(),
        Some("Luke is a Jedi.")
    );

    // variant served from the answer tier
    assert_eq!(h.engine.query("  WHO is luke?\t").await?, "Luke is a Jedi.");
    assert_eq!(h.completer.calls(), 1);

    // with answers gone, the embedding and search tiers still serve the variant
    let embed_calls = h.embedder.calls();
    h.engine.cache().answers.clear();
    h.engine.query("who IS LUKE?").await?;
    assert_eq!(h.embedder.calls(), embed_calls);
    assert_eq!(h.completer.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_passages_truncated_to_budget_in_rank_order() -> Result<()> {
    let settings = EngineSettings {
        budgeter: ContextBudgeter::from_word_budget(30),
        ..EngineSettings::default()
    };
    let h = harness_with(ScriptedCompleter::answering("ok"), settings);

    h.engine.ingest(&format!("yoda {}", words(49, "filler")), None).await?;
    h.engine.ingest(&format!("luke yoda {}", words(48, "padding")), None).await?;
    h.engine.ingest(&words(50, "unrelated"), None).await?;

    h.engine.query("luke yoda").await?;
    let prompt = h.completer.last_prompt();

    let first = format!("Passage 1: luke yoda {}{TRUNCATION_MARKER}", words(8, "padding"));
    let second = format!("Passage 2: yoda {}{TRUNCATION_MARKER}", words(9, "filler"));
    let third = format!("Passage 3: {}{TRUNCATION_MARKER}", words(10, "unrelated"));
    assert!(prompt.contains(&first), "{prompt}");
    assert!(prompt.contains(&second), "{prompt}");
    assert!(prompt.contains(&third), "{prompt}");
    Ok(())
}

#[tokio::test]
async fn test_strategies_rank_identically() -> Result<()> {
    let mut prompts = Vec::new();
    for strategy in [IndexStrategy::BruteForce, IndexStrategy::Flat] {
        let settings = EngineSettings {
            strategy,
            top_k: 2,
            ..EngineSettings::default()
        };
        let h = harness_with(ScriptedCompleter::answering("ok"), settings);
        h.engine
            .ingest_batch(vec![
                ("Han flies the Falcon".to_string(), None),
                ("Luke trained with Yoda".to_string(), None),
                ("Luke is a Jedi".to_string(), None),
                ("The Death Star".to_string(), None),
            ])
            .await?;
        assert_eq!(h.engine.stats().strategy, strategy);

        h.engine.query("Is Luke a Jedi?").await?;
        let prompt = h.completer.last_prompt();
        assert!(prompt.contains("Passage 1: Luke is a Jedi"), "{prompt}");
        assert!(prompt.contains("Passage 2: Luke trained with Yoda"), "{prompt}");
        assert!(!prompt.contains("Passage 3"));
        prompts.push(prompt);
    }
    assert_eq!(prompts[0], prompts[1]);
    Ok(())
}

#[tokio::test]
async fn test_empty_corpus_answers_without_completion() -> Result<()> {
    let h = harness("unused");
    assert_eq!(h.engine.rebuild_index().await?, 0);

    let answer = h.engine.query("What is the story about?").await?;
    assert_eq!(answer, NO_RELEVANT_INFORMATION);
    assert_eq!(h.completer.calls(), 0);
    assert!(h.engine.cache().search.is_empty());
    assert!(h.engine.cache().answers.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_completion_failure_is_visible_and_not_cached() -> Result<()> {
    let completer = ScriptedCompleter::answering("Luke is a Jedi.").then(Err(
        CompletionError::Status {
            status: 503,
            body: "model loading".to_string(),
        },
    ));
    let h = harness_with(completer, EngineSettings::default());
    h.engine.ingest("Luke Skywalker is a Jedi.", None).await?;

    let first = h.engine.query("Who is Luke?").await?;
    assert!(first.starts_with("Error: "), "{first}");
    assert!(first.contains("503"));
    assert!(h.engine.cache().answers.is_empty());

    let second = h.engine.query("Who is Luke?").await?;
    assert_eq!(second, "Luke is a Jedi.");
    assert_eq!(h.completer.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_embedding_failure_propagates() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store
        .add_if_hash_absent(NewDocument::new("Luke", vec![1.0; 9], None))
        .await?;
    let completer = Arc::new(ScriptedCompleter::answering("unused"));
    let engine = QueryEngine::start(
        store,
        Arc::new(UnreachableEmbedder),
        completer.clone(),
        EngineSettings::default(),
    )
    .await?;

    let err = engine.query("Who is Luke?").await.unwrap_err();
    assert!(matches!(err, RetrieverError::Embedding { .. }));
    assert_eq!(completer.calls(), 0);
    assert!(engine.cache().embeddings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_question_rejected() {
    let h = harness("unused");
    for question in ["", "   ", "\n\t"] {
        assert!(matches!(
            h.engine.query(question).await,
            Err(RetrieverError::EmptyQuestion)
        ));
    }
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn test_manual_refresh_waits_for_rebuild() -> Result<()> {
    let settings = EngineSettings {
        refresh: IndexRefresh::Manual,
        ..EngineSettings::default()
    };
    let h = harness_with(ScriptedCompleter::answering("Luke is a Jedi."), settings);

    assert!(h.engine.ingest("Luke Skywalker is a Jedi.", None).await?.is_created());
    assert_eq!(h.engine.query("Who is Luke?").await?, NO_RELEVANT_INFORMATION);

    assert_eq!(h.engine.rebuild_index().await?, 1);
    assert_eq!(h.engine.query("Who is Luke?").await?, "Luke is a Jedi.");
    Ok(())
}

#[tokio::test]
async fn test_ingest_invalidates_cached_results() -> Result<()> {
    let h = harness("first answer");
    h.engine.ingest("Luke Skywalker is a Jedi.", None).await?;
    h.engine.query("Who is Luke?").await?;
    assert_eq!(h.engine.cache().answers.len(), 1);

    // a duplicate changes nothing
    assert!(!h.engine.ingest("Luke Skywalker is a Jedi.", None).await?.is_created());
    assert_eq!(h.engine.cache().answers.len(), 1);

    h.engine.ingest("Luke trained with Yoda.", None).await?;
    assert!(h.engine.cache().answers.is_empty());
    assert!(h.engine.cache().search.is_empty());
    assert_eq!(h.engine.cache().embeddings.len(), 1);

    h.engine.query("Who is Luke?").await?;
    assert!(h.completer.last_prompt().contains("Passage 2:"));
    assert_eq!(h.store.document_count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_dropped_query_leaves_no_answer() -> Result<()> {
    let completer = ScriptedCompleter::answering("too late").with_delay(Duration::from_secs(30));
    let h = harness_with(completer, EngineSettings::default());
    h.engine.ingest("Luke Skywalker is a Jedi.", None).await?;

    let result =
        tokio::time::timeout(Duration::from_millis(50), h.engine.query("Who is Luke?")).await;
    assert!(result.is_err());
    assert_eq!(h.completer.calls(), 1);
    assert!(h.engine.cache().answers.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rebuild_during_completion_skips_caching() -> Result<()> {
    let completer = ScriptedCompleter::answering("Luke is a Jedi.").with_delay(Duration::from_millis(200));
    let h = harness_with(completer, EngineSettings::default());
    h.engine.ingest("Luke Skywalker is a Jedi.", None).await?;

    let engine = Arc::clone(&h.engine);
    let pending = tokio::spawn(async move { engine.query("Who is Luke?").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.completer.calls(), 1);
    h.engine.rebuild_index().await?;

    assert_eq!(pending.await??, "Luke is a Jedi.");
    let key = cache_key("Who is Luke?");
    assert_eq!(h.engine.cache().answers.get(&key), None);
    assert_eq!(h.engine.cache().search.get(&key), None);

    h.engine.query("Who is Luke?").await?;
    assert_eq!(h.completer.calls(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_during_rebuild() -> Result<()> {
    let h = harness("Luke is a Jedi.");
    h.engine
        .ingest_batch(vec![
            ("Luke Skywalker is a Jedi.".to_string(), None),
            ("Han flies the Falcon.".to_string(), None),
        ])
        .await?;

    let mut readers = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&h.engine);
        readers.push(tokio::spawn(async move {
            for j in 0..25 {
                let answer = engine.query(&format!("Who is Luke? {}", (i + j) % 3)).await?;
                assert_eq!(answer, "Luke is a Jedi.");
            }
            Ok::<_, RetrieverError>(())
        }));
    }

    for _ in 0..20 {
        assert_eq!(h.engine.rebuild_index().await?, 2);
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await??;
    }
    Ok(())
}

#[tokio::test]
async fn test_periodic_rebuild_picks_up_new_documents() -> Result<()> {
    let settings = EngineSettings {
        refresh: IndexRefresh::Manual,
        ..EngineSettings::default()
    };
    let h = harness_with(ScriptedCompleter::answering("ok"), settings);
    let handle = Arc::clone(&h.engine).spawn_periodic_rebuild(Duration::from_millis(20));

    h.store
        .add_if_hash_absent(NewDocument::new(
            "Luke",
            KeywordEmbedder::embed("Luke"),
            None,
        ))
        .await?;

    let mut indexed = 0;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        indexed = h.engine.stats().indexed_documents;
        if indexed == 1 {
            break;
        }
    }
    handle.abort();
    assert_eq!(indexed, 1);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_backed_engine() -> Result<()> {
    let temp_dir = tempdir()?;
    let store = Arc::new(SqliteStore::open(temp_dir.path()).await?);
    let completer = Arc::new(ScriptedCompleter::answering("A Jedi."));
    let engine = QueryEngine::start(
        store.clone(),
        Arc::new(KeywordEmbedder::default()),
        completer.clone(),
        EngineSettings::default(),
    )
    .await?;

    engine
        .ingest("Luke Skywalker is a Jedi.", Some("chapter=1".to_string()))
        .await?;
    assert_eq!(engine.query("Who is Luke?").await?, "A Jedi.");

    // a fresh engine over the same database sees the document
    let restarted = QueryEngine::start(
        store,
        Arc::new(KeywordEmbedder::default()),
        completer,
        EngineSettings::default(),
    )
    .await?;
    assert_eq!(restarted.stats().indexed_documents, 1);
    assert_eq!(restarted.stats().dimension, Some(VOCABULARY.len() + 1));
    Ok(())
}

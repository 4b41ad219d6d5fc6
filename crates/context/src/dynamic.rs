//! The dynamic context engine: externally sourced catalogs behind a cache.
//!
//! Combines a [`ContextLoader`] capability with the optimizer's selection
//! algorithm and the TTL cache. The cache key is the catalog variant (or
//! `"default"`), intentionally excluding topics and first-ness: the cache
//! stores the source-of-truth catalog per variant, and per-call filtering
//! happens after the cache.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::time::Duration;
use tracing::{debug, warn};

use stagehand_core::cancel::CancelToken;
use stagehand_core::error::LoaderError;
use stagehand_core::hooks::{supervised, OnVariantUsed};
use stagehand_core::loader::{
    ContextLoader, ContextSection, ContextSelection, LoadRequest, VariantEvent,
};
use stagehand_core::state::{Failure, PipelineState};

use crate::cache::{CacheError, TtlCache};
use crate::optimizer::{ContextOptimizer, ContextPolicy, SelectionQuery};

/// Extracts selection inputs from the state record.
///
/// The defaults derive everything from the request and the intent
/// extension; override any of them for bespoke routing.
#[derive(Clone)]
pub struct Extractors {
    pub topics: Arc<dyn Fn(&PipelineState) -> Vec<String> + Send + Sync>,
    pub is_first_message: Arc<dyn Fn(&PipelineState) -> bool + Send + Sync>,
    pub tone: Arc<dyn Fn(&PipelineState) -> Option<String> + Send + Sync>,
    pub variant: Arc<dyn Fn(&PipelineState) -> Option<String> + Send + Sync>,
}

impl Default for Extractors {
    fn default() -> Self {
        Self {
            // The classified intent (when it is not the catch-all) plus any
            // metadata "topics" array.
            topics: Arc::new(|state| {
                let mut topics = Vec::new();
                if let Some(intent) = state.intent() {
                    if intent.intent != "general" {
                        topics.push(intent.intent.clone());
                    }
                }
                if let Some(extra) = state.request.metadata.get("topics").and_then(|v| v.as_array())
                {
                    topics.extend(extra.iter().filter_map(|v| v.as_str().map(String::from)));
                }
                topics
            }),
            is_first_message: Arc::new(|state| state.request.is_first_message()),
            tone: Arc::new(|state| {
                state
                    .intent()
                    .and_then(|i| i.metadata.as_ref())
                    .and_then(|m| m.tone.clone())
            }),
            variant: Arc::new(|state| state.request.metadata_str("variant").map(String::from)),
        }
    }
}

/// Builds prompt context from an external source, cached per variant.
pub struct DynamicContextEngine {
    loader: Arc<dyn ContextLoader>,
    cache: TtlCache<Vec<ContextSection>>,
    selection: ContextOptimizer,
    fallback: Option<ContextOptimizer>,
    extractors: Extractors,
    on_variant_used: Option<Arc<OnVariantUsed>>,
    include_error_details: bool,
}

impl DynamicContextEngine {
    pub fn builder(loader: Arc<dyn ContextLoader>) -> DynamicContextEngineBuilder {
        DynamicContextEngineBuilder::new(loader)
    }

    /// Build the prompt context for a request.
    ///
    /// On loader failure the configured static fallback answers instead;
    /// with no fallback the error surfaces as a `{ 500, "dynamicContext" }`
    /// failure descriptor for the caller to attach to the state.
    pub async fn build(
        &self,
        state: &PipelineState,
        cancel: &CancelToken,
    ) -> Result<ContextSelection, Failure> {
        let topics = (self.extractors.topics)(state);
        let is_first_message = (self.extractors.is_first_message)(state);
        let tone = (self.extractors.tone)(state);
        let variant = (self.extractors.variant)(state);

        if let Some(v) = &variant {
            if let Some(hook) = &self.on_variant_used {
                let event = VariantEvent { variant: v.clone() };
                supervised("on_variant_used", || hook(&event));
            }
        }

        let key = variant.clone().unwrap_or_else(|| "default".to_string());
        let load_request = LoadRequest {
            topics: topics.clone(),
            variant: variant.clone(),
            is_first_message,
            user_id: state.request.metadata_str("userId").map(String::from),
            session_id: state.request.metadata_str("sessionId").map(String::from),
            metadata: state.request.metadata.clone(),
        };

        let loader = self.loader.clone();
        let cancel = cancel.clone();
        let loaded = self
            .cache
            .get_or_load(&key, move || async move {
                loader
                    .load(load_request, &cancel)
                    .await
                    .map_err(|e| CacheError::LoadFailed(e.to_string()))
            })
            .await;

        let query = SelectionQuery {
            topics,
            is_first_message,
            tone,
        };

        match loaded {
            Ok(catalog) => {
                debug!(
                    variant = %key,
                    sections = catalog.len(),
                    "Dynamic context catalog ready"
                );
                Ok(self.selection.select_from(&catalog, &query, variant))
            }
            Err(error) => {
                if let Some(fallback) = &self.fallback {
                    warn!(variant = %key, error = %error, "Context load failed; using static fallback");
                    Ok(fallback.select(&query))
                } else {
                    warn!(variant = %key, error = %error, "Context load failed; no fallback configured");
                    Err(Failure::internal(
                        "dynamicContext",
                        &error.to_string(),
                        self.include_error_details,
                    ))
                }
            }
        }
    }

    /// Drop the cached catalog for a variant (or `"default"`).
    pub async fn invalidate_variant(&self, variant: Option<&str>) {
        self.cache.invalidate(variant.unwrap_or("default")).await;
    }
}

/// Builder for [`DynamicContextEngine`].
pub struct DynamicContextEngineBuilder {
    loader: Arc<dyn ContextLoader>,
    policy: ContextPolicy,
    tone_map: HashMap<String, String>,
    ttl: Duration,
    fallback_catalog: Option<Vec<ContextSection>>,
    extractors: Extractors,
    on_variant_used: Option<Arc<OnVariantUsed>>,
    include_error_details: bool,
}

impl DynamicContextEngineBuilder {
    pub fn new(loader: Arc<dyn ContextLoader>) -> Self {
        Self {
            loader,
            policy: ContextPolicy::default(),
            tone_map: HashMap::new(),
            ttl: Duration::from_secs(300),
            fallback_catalog: None,
            extractors: Extractors::default(),
            on_variant_used: None,
            include_error_details: true,
        }
    }

    pub fn policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The tone map is shared by the live path and the fallback, so both
    /// append the same instruction text.
    pub fn tone_map(mut self, tone_map: HashMap<String, String>) -> Self {
        self.tone_map = tone_map;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// A static catalog to answer from when the loader fails.
    pub fn fallback_catalog(mut self, catalog: Vec<ContextSection>) -> Self {
        self.fallback_catalog = Some(catalog);
        self
    }

    pub fn extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn on_variant_used(
        mut self,
        hook: impl Fn(&VariantEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_variant_used = Some(Arc::new(hook));
        self
    }

    pub fn include_error_details(mut self, include: bool) -> Self {
        self.include_error_details = include;
        self
    }

    pub fn build(self) -> DynamicContextEngine {
        let selection =
            ContextOptimizer::new(Vec::new(), self.policy).with_tone_map(self.tone_map.clone());
        let fallback = self.fallback_catalog.map(|catalog| {
            ContextOptimizer::new(catalog, self.policy).with_tone_map(self.tone_map)
        });

        DynamicContextEngine {
            loader: self.loader,
            cache: TtlCache::new(self.ttl),
            selection,
            fallback,
            extractors: self.extractors,
            on_variant_used: self.on_variant_used,
            include_error_details: self.include_error_details,
        }
    }
}

/// A loader over a fixed in-memory catalog. Useful for tests and for
/// setups whose sections ship with the binary.
pub struct StaticCatalogLoader {
    sections: Vec<ContextSection>,
}

impl StaticCatalogLoader {
    pub fn new(sections: Vec<ContextSection>) -> Self {
        Self { sections }
    }
}

#[async_trait]
impl ContextLoader for StaticCatalogLoader {
    async fn load(
        &self,
        _request: LoadRequest,
        _cancel: &CancelToken,
    ) -> Result<Vec<ContextSection>, LoaderError> {
        Ok(self.sections.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use stagehand_core::classifier::{ClassificationMethod, IntentMetadata, IntentResult};
    use stagehand_core::message::{ChatRequest, Message};
    use stagehand_core::state::{keys, ExtensionValue};

    fn catalog() -> Vec<ContextSection> {
        vec![
            ContextSection::new("core", "A").always_included(),
            ContextSection::new("help", "B").with_topics(["help"]),
            ContextSection::new("tech", "C").with_topics(["tech"]),
        ]
    }

    fn selective() -> ContextPolicy {
        ContextPolicy {
            first_message: crate::optimizer::SelectionMode::Selective,
            follow_up: crate::optimizer::SelectionMode::Selective,
        }
    }

    /// Counts loads; optionally fails every call.
    struct CountingLoader {
        sections: Vec<ContextSection>,
        calls: AtomicUsize,
        failing: bool,
    }

    impl CountingLoader {
        fn ok(sections: Vec<ContextSection>) -> Arc<Self> {
            Arc::new(Self {
                sections,
                calls: AtomicUsize::new(0),
                failing: false,
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                sections: Vec::new(),
                calls: AtomicUsize::new(0),
                failing: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContextLoader for CountingLoader {
        async fn load(
            &self,
            _request: LoadRequest,
            _cancel: &CancelToken,
        ) -> Result<Vec<ContextSection>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                Err(LoaderError::Unavailable("cms down".into()))
            } else {
                Ok(self.sections.clone())
            }
        }
    }

    fn state_with_topic(topic: &str) -> PipelineState {
        PipelineState::new(
            ChatRequest::new(vec![Message::user("hi"), Message::assistant("hello")])
                .with_metadata("topics", serde_json::json!([topic])),
        )
    }

    #[tokio::test]
    async fn builds_selection_from_loaded_catalog() {
        let loader = CountingLoader::ok(catalog());
        let engine = DynamicContextEngine::builder(loader.clone())
            .policy(selective())
            .build();

        let selection = engine
            .build(&state_with_topic("help"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(selection.sections_included, vec!["core", "help"]);
        assert_eq!(selection.system_prompt, "A\n\nB");
        assert!(selection.variant.is_none());
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn catalog_is_cached_across_topic_changes() {
        // Topics do not participate in the cache key: the second build
        // filters the cached catalog differently without reloading.
        let loader = CountingLoader::ok(catalog());
        let engine = DynamicContextEngine::builder(loader.clone())
            .policy(selective())
            .build();

        let help = engine
            .build(&state_with_topic("help"), &CancelToken::new())
            .await
            .unwrap();
        let tech = engine
            .build(&state_with_topic("tech"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(loader.calls(), 1, "catalog must come from the cache");
        assert_eq!(help.sections_included, vec!["core", "help"]);
        assert_eq!(tech.sections_included, vec!["core", "tech"]);
    }

    #[tokio::test]
    async fn variants_cache_separately_and_fire_the_hook() {
        let loader = CountingLoader::ok(catalog());
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let engine = DynamicContextEngine::builder(loader.clone())
            .policy(selective())
            .on_variant_used(move |event| sink.lock().unwrap().push(event.variant.clone()))
            .build();

        let variant_state = PipelineState::new(
            ChatRequest::new(vec![Message::user("hi")])
                .with_metadata("variant", serde_json::json!("experiment-b")),
        );

        let selection = engine.build(&variant_state, &CancelToken::new()).await.unwrap();
        assert_eq!(selection.variant.as_deref(), Some("experiment-b"));

        engine
            .build(&state_with_topic("help"), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(loader.calls(), 2, "distinct variants load separately");
        assert_eq!(seen.lock().unwrap().as_slice(), ["experiment-b"]);
    }

    #[tokio::test]
    async fn loader_failure_uses_fallback_catalog() {
        let engine = DynamicContextEngine::builder(CountingLoader::broken())
            .policy(selective())
            .tone_map(HashMap::from([("friendly".to_string(), "T".to_string())]))
            .fallback_catalog(catalog())
            .build();

        let state = state_with_topic("help");
        let selection = engine.build(&state, &CancelToken::new()).await.unwrap();

        assert_eq!(selection.sections_included, vec!["core", "help"]);
        assert_eq!(selection.system_prompt, "A\n\nB");
    }

    #[tokio::test]
    async fn fallback_appends_the_shared_tone_instruction() {
        let engine = DynamicContextEngine::builder(CountingLoader::broken())
            .policy(selective())
            .tone_map(HashMap::from([(
                "informative".to_string(),
                "Be informative.".to_string(),
            )]))
            .fallback_catalog(catalog())
            .build();

        let state = PipelineState::new(ChatRequest::new(vec![
            Message::user("hi"),
            Message::assistant("hello"),
        ]))
        .with_extension(
            keys::INTENT,
            ExtensionValue::Intent(IntentResult {
                intent: "help".into(),
                confidence: 0.9,
                matched_keywords: vec![],
                method: ClassificationMethod::Keyword,
                metadata: Some(IntentMetadata {
                    tone: Some("informative".into()),
                    ..Default::default()
                }),
            }),
        );

        let selection = engine.build(&state, &CancelToken::new()).await.unwrap();
        assert!(selection.system_prompt.ends_with("\n\nBe informative."));
    }

    #[tokio::test]
    async fn loader_failure_without_fallback_surfaces_500() {
        let engine = DynamicContextEngine::builder(CountingLoader::broken())
            .policy(selective())
            .build();

        let failure = engine
            .build(&state_with_topic("help"), &CancelToken::new())
            .await
            .unwrap_err();

        assert_eq!(failure.status_code, 500);
        assert_eq!(failure.step.as_deref(), Some("dynamicContext"));
        assert!(failure.details.as_deref().unwrap_or("").contains("cms down"));
    }

    #[tokio::test]
    async fn default_extractors_use_intent_and_tone() {
        let loader = CountingLoader::ok(catalog());
        let engine = DynamicContextEngine::builder(loader)
            .policy(selective())
            .tone_map(HashMap::from([("warm".to_string(), "W".to_string())]))
            .build();

        let state = PipelineState::new(ChatRequest::new(vec![
            Message::user("hi"),
            Message::assistant("hello"),
        ]))
        .with_extension(
            keys::INTENT,
            ExtensionValue::Intent(IntentResult {
                intent: "tech".into(),
                confidence: 1.0,
                matched_keywords: vec![],
                method: ClassificationMethod::Keyword,
                metadata: Some(IntentMetadata {
                    tone: Some("warm".into()),
                    ..Default::default()
                }),
            }),
        );

        let selection = engine.build(&state, &CancelToken::new()).await.unwrap();
        assert_eq!(selection.sections_included, vec!["core", "tech"]);
        assert_eq!(selection.system_prompt, "A\n\nC\n\nW");
    }

    #[tokio::test]
    async fn invalidate_variant_forces_reload() {
        let loader = CountingLoader::ok(catalog());
        let engine = DynamicContextEngine::builder(loader.clone())
            .policy(selective())
            .build();

        let state = state_with_topic("help");
        engine.build(&state, &CancelToken::new()).await.unwrap();
        engine.invalidate_variant(None).await;
        engine.build(&state, &CancelToken::new()).await.unwrap();

        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn static_catalog_loader_round_trip() {
        let engine = DynamicContextEngine::builder(Arc::new(StaticCatalogLoader::new(catalog())))
            .policy(selective())
            .build();

        let selection = engine
            .build(&state_with_topic("tech"), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(selection.sections_included, vec!["core", "tech"]);
    }
}

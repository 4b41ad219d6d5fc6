//! End-to-end pipeline scenarios: full plans driven through the step
//! executor with scripted capabilities behind every seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;

use stagehand_context::optimizer::{ContextPolicy, SelectionMode};
use stagehand_context::{DynamicContextEngine, StaticCatalogLoader};
use stagehand_core::cancel::CancelToken;
use stagehand_core::classifier::{
    ClassificationMethod, IntentMetadata, IntentPattern, IntentTier, LlmIntent,
};
use stagehand_core::error::{ClassifyError, InvokerError, LimiterError, LoaderError};
use stagehand_core::handler::handler_fn;
use stagehand_core::invoker::{GenerationOutput, GenerationRequest, ModelInvoker};
use stagehand_core::limiter::{RateDecision, RateLimiter};
use stagehand_core::loader::{ContextLoader, ContextSection, LoadRequest};
use stagehand_core::message::{ChatRequest, Message};
use stagehand_core::state::{keys, Failure, PipelineState};
use stagehand_engine::{ExecutorConfig, ExecutorHooks, Plan, Stage, StepExecutor};
use stagehand_intent::{HybridIntentResolver, KeywordClassifier};
use stagehand_stages::{
    GenerationStage, IntentStage, ModerationConfig, ModerationStage, PromptContextStage,
    RateLimitStage,
};

// ── Scripted capabilities ─────────────────────────────────────────────────

struct FixedLimiter {
    decision: RateDecision,
}

#[async_trait]
impl RateLimiter for FixedLimiter {
    async fn check(&self, _identifier: &str) -> Result<RateDecision, LimiterError> {
        Ok(self.decision.clone())
    }
}

struct FixedTier {
    intent: LlmIntent,
}

#[async_trait]
impl IntentTier for FixedTier {
    async fn classify(
        &self,
        _message: &str,
        _cancel: &CancelToken,
    ) -> Result<LlmIntent, ClassifyError> {
        Ok(self.intent.clone())
    }
}

struct RecordingInvoker {
    requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingInvoker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelInvoker for RecordingInvoker {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        _cancel: &CancelToken,
    ) -> Result<GenerationOutput, InvokerError> {
        self.requests.lock().unwrap().push(request);
        Ok(GenerationOutput {
            text: "All good!".into(),
            finish_reason: "stop".into(),
            usage: None,
        })
    }
}

struct CountingLoader {
    sections: Vec<ContextSection>,
    calls: AtomicUsize,
}

impl CountingLoader {
    fn new(sections: Vec<ContextSection>) -> Arc<Self> {
        Arc::new(Self {
            sections,
            calls: AtomicUsize::new(0),
        })
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
        tokio::task::yield_now().await;
        Ok(self.sections.clone())
    }
}

// ── Shared fixtures ───────────────────────────────────────────────────────

fn selective_policy() -> ContextPolicy {
    ContextPolicy {
        first_message: SelectionMode::Selective,
        follow_up: SelectionMode::Selective,
    }
}

fn catalog() -> Vec<ContextSection> {
    vec![
        ContextSection::new("core", "A").always_included(),
        ContextSection::new("help", "B").with_topics(["help"]),
        ContextSection::new("tech", "C").with_topics(["tech"]),
    ]
}

fn keyword_classifier() -> KeywordClassifier {
    KeywordClassifier::new(vec![
        IntentPattern::new("greeting", ["hello", "hi"]),
        IntentPattern::new("help", ["help"]),
    ])
    .with_metadata(HashMap::from([(
        "question".to_string(),
        IntentMetadata {
            tone: Some("Be informative and thorough".into()),
            deep_link: Some("/faq".into()),
            ..Default::default()
        },
    )]))
}

fn request(text: &str) -> PipelineState {
    PipelineState::new(ChatRequest::new(vec![Message::user(text)]))
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn keyword_classification_clear_winner() {
    let resolver = Arc::new(HybridIntentResolver::new(keyword_classifier()));
    let plan = Plan::builder()
        .stage(Stage::new("intent", Arc::new(IntentStage::new(resolver))))
        .build()
        .unwrap();

    let outcome = StepExecutor::default()
        .execute(request("Hello there"), &plan, &CancelToken::new())
        .await;

    assert!(outcome.ok);
    let intent = outcome.state.intent().unwrap();
    assert_eq!(intent.intent, "greeting");
    assert_eq!(intent.confidence, 1.0);
    assert_eq!(intent.matched_keywords, vec!["hello"]);
    assert_eq!(intent.method, ClassificationMethod::Keyword);
}

#[tokio::test]
async fn hybrid_fallback_uses_llm_intents_metadata() {
    let resolver = Arc::new(
        HybridIntentResolver::new(keyword_classifier()).with_llm_tier(Arc::new(FixedTier {
            intent: LlmIntent {
                intent: "question".into(),
                confidence: 0.9,
                reasoning: None,
                usage: None,
            },
        })),
    );
    let plan = Plan::builder()
        .stage(Stage::new("intent", Arc::new(IntentStage::new(resolver))))
        .build()
        .unwrap();

    let outcome = StepExecutor::default()
        .execute(request("23 + 44"), &plan, &CancelToken::new())
        .await;

    let intent = outcome.state.intent().unwrap();
    assert_eq!(intent.intent, "question");
    let metadata = intent.metadata.as_ref().unwrap();
    // Metadata follows the LLM-chosen intent, not the keyword tier's.
    assert_eq!(metadata.tone.as_deref(), Some("Be informative and thorough"));
    assert_eq!(metadata.deep_link.as_deref(), Some("/faq"));
}

#[tokio::test]
async fn parallel_group_merges_with_later_wins() {
    let a = Stage::new(
        "profileLoader",
        handler_fn(|state: PipelineState| async move {
            Ok(state.with_custom("userProfile", serde_json::json!({"name": "Ada"})))
        }),
    );
    let b = Stage::new(
        "preferenceLoader",
        handler_fn(|state: PipelineState| async move {
            Ok(state.with_custom("preferences", serde_json::json!({"theme": "dark"})))
        }),
    );
    let c = Stage::new(
        "permissionLoader",
        handler_fn(|state: PipelineState| async move {
            Ok(state
                .with_custom("permissions", serde_json::json!(["read", "write"]))
                .with_custom("userProfile", serde_json::json!("OVERRIDE")))
        }),
    );

    let plan = Plan::builder().parallel(vec![a, b, c]).build().unwrap();
    let outcome = StepExecutor::default()
        .execute(request("hi"), &plan, &CancelToken::new())
        .await;

    assert!(outcome.ok);
    assert!(outcome.state.custom("preferences").is_some());
    assert!(outcome.state.custom("permissions").is_some());
    assert_eq!(
        outcome.state.custom("userProfile"),
        Some(&serde_json::json!("OVERRIDE"))
    );
}

#[tokio::test]
async fn parallel_group_stops_on_first_declared_error() {
    let ok = |name: &'static str| {
        Stage::new(
            name,
            handler_fn(move |state: PipelineState| async move {
                Ok(state.with_custom(name, serde_json::json!(true)))
            }),
        )
    };
    let failing = Stage::new(
        "B",
        handler_fn(|state: PipelineState| async move {
            Ok(state.with_failure(Failure::validation("rejected", "B")))
        }),
    );

    let plan = Plan::builder()
        .parallel(vec![ok("A"), failing, ok("C")])
        .build()
        .unwrap();
    let outcome = StepExecutor::default()
        .execute(request("hi"), &plan, &CancelToken::new())
        .await;

    assert!(!outcome.ok);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.step.as_deref(), Some("B"));
    assert_eq!(failure.status_code, 400);
    assert!(outcome.state.custom("C").is_none());
}

#[tokio::test]
async fn shared_engine_coalesces_concurrent_catalog_loads() {
    let loader = CountingLoader::new(catalog());
    let engine = Arc::new(
        DynamicContextEngine::builder(loader.clone())
            .policy(selective_policy())
            .build(),
    );

    let plan = Arc::new(
        Plan::builder()
            .stage(Stage::new(
                "promptContext",
                Arc::new(PromptContextStage::new(engine)),
            ))
            .build()
            .unwrap(),
    );
    let executor = Arc::new(StepExecutor::default());

    let run = |text: &str| {
        let plan = plan.clone();
        let executor = executor.clone();
        let state = request(text);
        async move { executor.execute(state, &plan, &CancelToken::new()).await }
    };

    let (a, b) = tokio::join!(run("hello"), run("hello again"));

    assert!(a.ok && b.ok);
    assert_eq!(
        loader.calls.load(Ordering::SeqCst),
        1,
        "concurrent executions must share one catalog load"
    );
}

#[tokio::test(start_paused = true)]
async fn catalog_reloads_after_ttl() {
    let loader = CountingLoader::new(catalog());
    let engine = Arc::new(
        DynamicContextEngine::builder(loader.clone())
            .policy(selective_policy())
            .cache_ttl(tokio::time::Duration::from_secs(300))
            .build(),
    );
    let plan = Plan::builder()
        .stage(Stage::new(
            "promptContext",
            Arc::new(PromptContextStage::new(engine)),
        ))
        .build()
        .unwrap();
    let executor = StepExecutor::default();

    executor
        .execute(request("hi"), &plan, &CancelToken::new())
        .await;
    executor
        .execute(request("hi again"), &plan, &CancelToken::new())
        .await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(tokio::time::Duration::from_secs(301)).await;

    executor
        .execute(request("back later"), &plan, &CancelToken::new())
        .await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn optimizer_tone_injection_and_savings() {
    let engine = Arc::new(
        DynamicContextEngine::builder(Arc::new(StaticCatalogLoader::new(catalog())))
            .policy(selective_policy())
            .tone_map(HashMap::from([("friendly".to_string(), "T".to_string())]))
            .build(),
    );

    // Follow-up conversation, topic "help", tone via the intent extension.
    let state = PipelineState::new(
        ChatRequest::new(vec![
            Message::user("hello"),
            Message::assistant("hi!"),
            Message::user("I need help"),
        ])
        .with_metadata("topics", serde_json::json!(["help"])),
    )
    .with_extension(
        keys::INTENT,
        stagehand_core::state::ExtensionValue::Intent(
            stagehand_core::classifier::IntentResult {
                intent: "general".into(),
                confidence: 0.0,
                matched_keywords: vec![],
                method: ClassificationMethod::Keyword,
                metadata: Some(IntentMetadata {
                    tone: Some("friendly".into()),
                    ..Default::default()
                }),
            },
        ),
    );

    let plan = Plan::builder()
        .stage(Stage::new(
            "promptContext",
            Arc::new(PromptContextStage::new(engine)),
        ))
        .build()
        .unwrap();

    let outcome = StepExecutor::default()
        .execute(state, &plan, &CancelToken::new())
        .await;

    let selection = outcome.state.prompt_context().unwrap();
    assert_eq!(selection.system_prompt, "A\n\nB\n\nT");
    assert_eq!(selection.sections_included, vec!["core", "help"]);
    assert_eq!(selection.total_sections, 3);
    // ceil(len/4): "A\n\nB\n\nT" is 7 chars, "A\n\nB\n\nC" is 7 chars.
    assert_eq!(selection.token_estimate, 2);
    assert_eq!(selection.max_token_estimate, 2);
}

#[tokio::test]
async fn full_pipeline_happy_path() {
    let resolver = Arc::new(HybridIntentResolver::new(keyword_classifier()));
    let engine = Arc::new(
        DynamicContextEngine::builder(Arc::new(StaticCatalogLoader::new(catalog())))
            .policy(selective_policy())
            .build(),
    );
    let invoker = RecordingInvoker::new();

    let moderation = ModerationStage::new(ModerationConfig {
        spam_patterns: vec!["buy now".into()],
        ..Default::default()
    })
    .unwrap();

    let completed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = completed.clone();

    let plan = Plan::builder()
        .stage(Stage::new("contentModeration", Arc::new(moderation)))
        .stage(Stage::new(
            "rateLimit",
            Arc::new(RateLimitStage::new(Arc::new(FixedLimiter {
                decision: RateDecision::allow(),
            }))),
        ))
        .stage(Stage::new("intent", Arc::new(IntentStage::new(resolver))))
        .stage(Stage::new(
            "promptContext",
            Arc::new(PromptContextStage::new(engine)),
        ))
        .stage(Stage::new(
            "aiResponse",
            Arc::new(GenerationStage::new(invoker.clone())),
        ))
        .build()
        .unwrap();

    let executor = StepExecutor::new(ExecutorConfig {
        include_error_details: true,
        hooks: ExecutorHooks::new()
            .with_step_complete(move |name, _ms| sink.lock().unwrap().push(name.to_string())),
    });

    let state = PipelineState::new(
        ChatRequest::new(vec![Message::user("I need help with exports")])
            .with_metadata("userId", serde_json::json!("u_1")),
    );

    let outcome = executor.execute(state, &plan, &CancelToken::new()).await;

    assert!(outcome.ok, "failure: {:?}", outcome.failure);
    assert!(outcome.state.moderation().unwrap().passed);
    assert!(outcome.state.rate_limit().unwrap().allowed);
    assert_eq!(outcome.state.intent().unwrap().intent, "help");
    let selection = outcome.state.prompt_context().unwrap();
    assert_eq!(selection.sections_included, vec!["core", "help"]);
    assert_eq!(outcome.state.model_response().unwrap().text, "All good!");

    // The generation call received the assembled system prompt.
    let requests = invoker.requests.lock().unwrap();
    assert_eq!(requests[0].system.as_deref(), Some("A\n\nB"));

    assert_eq!(
        completed.lock().unwrap().as_slice(),
        [
            "contentModeration",
            "rateLimit",
            "intent",
            "promptContext",
            "aiResponse"
        ]
    );
}

#[tokio::test]
async fn moderation_failure_stops_the_whole_pipeline() {
    let invoker = RecordingInvoker::new();
    let moderation = ModerationStage::new(ModerationConfig {
        spam_patterns: vec!["buy now".into()],
        ..Default::default()
    })
    .unwrap();

    let plan = Plan::builder()
        .stage(Stage::new("contentModeration", Arc::new(moderation)))
        .stage(Stage::new(
            "aiResponse",
            Arc::new(GenerationStage::new(invoker.clone())),
        ))
        .build()
        .unwrap();

    let outcome = StepExecutor::default()
        .execute(request("BUY NOW limited offer"), &plan, &CancelToken::new())
        .await;

    assert!(!outcome.ok);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.status_code, 400);
    assert_eq!(failure.step.as_deref(), Some("contentModeration"));
    assert_eq!(invoker.calls(), 0, "generation must not run after a failure");
}

#[tokio::test]
async fn rate_limited_request_carries_retry_after() {
    let plan = Plan::builder()
        .stage(Stage::new(
            "rateLimit",
            Arc::new(RateLimitStage::new(Arc::new(FixedLimiter {
                decision: RateDecision::block(Some(30)),
            }))),
        ))
        .build()
        .unwrap();

    let outcome = StepExecutor::default()
        .execute(request("hello"), &plan, &CancelToken::new())
        .await;

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.status_code, 429);
    assert_eq!(failure.retry_after, Some(30));
    assert_eq!(failure.message, "Too many requests. Please try again later.");
}

//! Engine composition root.
//!
//! An `Engine` owns one instance of every component and is constructed once
//! by the host process. There are no module-level singletons; everything is
//! reached through this object, which keeps tests hermetic.

use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::EngineResult;
use crate::feedback::{FeedbackContext, FeedbackReport, QaFeedbackProcessor, QaVerdict};
use crate::gotchas::{GotchaMatch, GotchaRegistry};
use crate::learning::{
    CaptureOutcome, PatternCapture, PatternStore, PatternValidator, SearchHit, SemanticSearch,
    StoreOutcome,
};
use crate::registry::WorkflowRegistry;
use crate::scoring::ConfidenceScorer;
use crate::suggest::{
    build_context, ContextOptions, ContextSource, FileSessionSource, SessionContext,
    SuggestionEngine, SuggestionSet,
};
use crate::waves::{TaskSpec, WaveAnalysis, WaveAnalyzer};

/// Result of feeding a command or completion signal through the learning
/// pipeline.
#[derive(Debug)]
pub enum LearnOutcome {
    /// The session is still buffering
    Buffering,

    /// A candidate was extracted and offered to the store
    Stored(StoreOutcome),

    /// The session ended without a usable pattern
    Discarded {
        /// Why nothing was stored
        reason: String,
    },
}

/// The workflow intelligence engine.
pub struct Engine {
    config: Config,
    registry: Arc<WorkflowRegistry>,
    analyzer: WaveAnalyzer,
    suggester: SuggestionEngine,
    capture: PatternCapture,
    validator: PatternValidator,
    patterns: PatternStore,
    gotchas: GotchaRegistry,
    feedback: QaFeedbackProcessor,
    search: SemanticSearch,
    source: Box<dyn ContextSource>,
    known_commands: Vec<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("patterns", &self.patterns.len()).finish()
    }
}

impl Engine {
    /// Construct an engine with the default file-backed context source.
    pub async fn new(config: Config) -> EngineResult<Self> {
        let source = FileSessionSource::new(config.suggest.session_log_path.clone());
        Self::with_source(config, Box::new(source)).await
    }

    /// Construct an engine with a custom context source.
    pub async fn with_source(
        config: Config,
        source: Box<dyn ContextSource>,
    ) -> EngineResult<Self> {
        let registry = Arc::new(WorkflowRegistry::new(&config.registry));
        let scorer = ConfidenceScorer::new(&config.scoring)?;
        let suggester =
            SuggestionEngine::new(Arc::clone(&registry), scorer, config.suggest.clone());
        let analyzer = WaveAnalyzer::new(config.waves.clone());
        let capture = PatternCapture::new(config.capture.clone());
        let validator = PatternValidator::new(config.capture.clone(), config.validator.clone());
        let patterns = PatternStore::open(&config.store).await;
        let gotchas = GotchaRegistry::open(&config.store, config.gotchas.clone()).await;
        let feedback = QaFeedbackProcessor::open(&config.store).await;
        let search = SemanticSearch::new(config.search.clone());

        // Known commands seed the validator; a missing definitions file only
        // degrades recognition, it does not block construction.
        let mut known_commands = config.capture.key_commands.clone();
        match registry.load().await {
            Ok(set) => {
                for workflow in &set.workflows {
                    for trigger in workflow.triggers() {
                        if !known_commands.iter().any(|c| c == trigger) {
                            known_commands.push(trigger.to_string());
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "workflow definitions unavailable at startup"),
        }

        Ok(Self {
            config,
            registry,
            analyzer,
            suggester,
            capture,
            validator,
            patterns,
            gotchas,
            feedback,
            search,
            source,
            known_commands,
        })
    }

    /// Assemble a session context from overrides and the context source.
    pub async fn build_context(&self, options: ContextOptions) -> SessionContext {
        build_context(options, self.source.as_ref()).await
    }

    /// Produce ranked next-action suggestions for a context.
    pub async fn suggest_next(&self, context: &SessionContext) -> SuggestionSet {
        let active: Vec<_> =
            self.patterns.active(&self.validator).into_iter().cloned().collect();
        let signal = self.source.runtime_signal().await;
        self.suggester.suggest_next(context, &active, signal.as_ref()).await
    }

    /// Analyze a workflow's task list into parallel waves.
    pub fn analyze_waves(
        &self,
        workflow_id: &str,
        tasks: &[TaskSpec],
    ) -> EngineResult<WaveAnalysis> {
        self.analyzer.analyze(workflow_id, tasks)
    }

    /// Process an external quality verdict.
    pub fn process_qa_result(
        &mut self,
        verdict: &QaVerdict,
        context: &FeedbackContext,
    ) -> FeedbackReport {
        self.feedback.process(verdict, context, &mut self.patterns, &mut self.gotchas)
    }

    /// Feed a command into the learning pipeline.
    pub fn observe_command(
        &mut self,
        session_id: &str,
        command: &str,
        agent: Option<&str>,
    ) -> LearnOutcome {
        let outcome = self.capture.record(session_id, command, agent);
        self.learn(outcome)
    }

    /// Close a session explicitly.
    pub fn complete_session(&mut self, session_id: &str, success: bool) -> LearnOutcome {
        let outcome = self.capture.complete(session_id, success);
        self.learn(outcome)
    }

    /// Attach the active workflow to a capture session.
    pub fn set_session_workflow(&mut self, session_id: &str, workflow: &str) {
        self.capture.set_workflow(session_id, workflow);
    }

    /// Record that a pattern-sourced suggestion was accepted.
    pub fn record_acceptance(&mut self, pattern_id: &str) {
        self.patterns.touch(pattern_id);
    }

    /// Query known failure patterns relevant to a context description.
    pub fn query_gotchas(&self, context: &str) -> Vec<GotchaMatch> {
        self.gotchas.query(context)
    }

    /// Fuzzy-search learned patterns.
    pub fn search_patterns(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.search.search(query, self.patterns.all(), limit)
    }

    /// Persist every store as a whole-file rewrite.
    pub async fn persist(&self) -> EngineResult<()> {
        self.patterns.persist().await?;
        self.gotchas.persist().await?;
        self.feedback.persist().await?;
        Ok(())
    }

    /// The pattern store.
    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    /// The gotcha registry.
    pub fn gotchas(&self) -> &GotchaRegistry {
        &self.gotchas
    }

    /// The workflow registry.
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn learn(&mut self, outcome: CaptureOutcome) -> LearnOutcome {
        match outcome {
            CaptureOutcome::Buffering => LearnOutcome::Buffering,
            CaptureOutcome::Rejected { reason } => LearnOutcome::Discarded { reason },
            CaptureOutcome::Candidate(candidate) => LearnOutcome::Stored(self.patterns.offer(
                &candidate,
                &self.validator,
                &self.known_commands,
            )),
        }
    }
}

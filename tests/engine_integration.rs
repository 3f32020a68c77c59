//! End-to-end tests for the workflow intelligence engine.

use std::path::PathBuf;

use flowsense::{
    Config, ContextOptions, Engine, FeedbackContext, GateDecision, LearnOutcome, PatternStatus,
    QaVerdict, SessionContext, StoreOutcome, SuggestionSource, TaskSpec,
};
use tempfile::TempDir;

const DEFS: &str = r#"
workflows:
  - name: epic-creation
    description: Break an epic into stories and deliver them
    agents: [pm, sm, dev, qa]
    states:
      - state: epic-created
        trigger: create-epic
        confidence: 0.85
        next_steps:
          - { command: create-story, args: "{epic_path}", description: Draft the first story, priority: 1 }
      - state: story-created
        trigger: create-story
        confidence: 0.9
        next_steps:
          - { command: develop-story, description: Implement the story, priority: 1 }
          - { command: review-backlog, priority: 2 }
      - state: story-developed
        trigger: develop-story
        confidence: 0.8
        next_steps:
          - { command: review-story, priority: 1 }
  - name: hotfix
    agents: [dev]
    states:
      - state: fix-started
        trigger: start-hotfix
      - state: fix-shipped
        trigger: deploy-hotfix
"#;

async fn test_config(dir: &TempDir) -> Config {
    let _ = tracing_subscriber::fmt().with_env_filter("flowsense=debug").try_init();

    let defs_path = dir.path().join("workflows.yaml");
    tokio::fs::write(&defs_path, DEFS).await.unwrap();

    let mut config = Config::default();
    config.registry.definitions_path = defs_path;
    config.store.patterns_path = dir.path().join("patterns.json");
    config.store.gotchas_path = dir.path().join("gotchas.json");
    config.store.feedback_path = dir.path().join("feedback.json");
    config
}

fn context_after(commands: &[&str]) -> SessionContext {
    SessionContext {
        agent_id: Some("dev".into()),
        last_command: commands.last().map(|c| (*c).to_string()),
        last_commands: commands.iter().map(|c| (*c).to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn suggests_next_step_from_matched_workflow() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(test_config(&dir).await).await.unwrap();

    let context = context_after(&["create-epic", "create-story"]);
    let result = engine.suggest_next(&context).await;

    assert_eq!(result.workflow.as_deref(), Some("epic-creation"));
    assert_eq!(result.current_state.as_deref(), Some("story-created"));
    assert_eq!(result.suggestions[0].command, "develop-story");
    assert!(result.confidence > 0.0);
}

#[tokio::test]
async fn suggestion_cache_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(test_config(&dir).await).await.unwrap();

    let context = context_after(&["create-epic", "create-story"]);
    let first = engine.suggest_next(&context).await;
    let second = engine.suggest_next(&context).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn unrelated_history_falls_back() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(test_config(&dir).await).await.unwrap();

    let context = context_after(&["ls", "cat readme.md"]);
    let result = engine.suggest_next(&context).await;

    assert!(result.workflow.is_none());
    assert!(result.suggestions.iter().all(|s| s.source == SuggestionSource::Fallback));
}

#[tokio::test]
async fn wave_analysis_through_engine() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(test_config(&dir).await).await.unwrap();

    let tasks = vec![
        TaskSpec::new("a", vec![]).with_duration(10),
        TaskSpec::new("b", vec![]).with_duration(10),
        TaskSpec::new("c", vec!["a".into(), "b".into()]).with_duration(10),
    ];
    let analysis = engine.analyze_waves("epic-creation", &tasks).unwrap();

    assert_eq!(analysis.total_tasks, 3);
    assert_eq!(analysis.waves.len(), 2);
    assert_eq!(analysis.optimization_gain, 33);
}

#[tokio::test]
async fn learned_pattern_boosts_future_suggestions() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(test_config(&dir).await).await.unwrap();

    // Two successful sessions teach the same sequence, promoting it.
    for session in ["s1", "s2"] {
        engine.set_session_workflow(session, "epic-creation");
        engine.observe_command(session, "create-epic", Some("pm"));
        engine.observe_command(session, "create-story", Some("sm"));
        engine.observe_command(session, "develop-story", Some("dev"));
        let outcome = engine.complete_session(session, true);
        assert!(matches!(outcome, LearnOutcome::Stored(_)));
    }
    assert_eq!(engine.patterns().len(), 1);
    assert_eq!(
        engine.patterns().all()[0].workflow.as_deref(),
        Some("epic-creation")
    );

    let context = context_after(&["create-epic", "create-story"]);
    let result = engine.suggest_next(&context).await;

    let top = &result.suggestions[0];
    assert_eq!(top.command, "develop-story");
    assert_eq!(top.source, SuggestionSource::Pattern);
}

#[tokio::test]
async fn qa_failures_deprecate_and_create_gotchas() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(test_config(&dir).await).await.unwrap();

    engine.observe_command("s1", "create-story", Some("sm"));
    engine.observe_command("s1", "develop-story", Some("dev"));
    engine.observe_command("s1", "run-tests", Some("dev"));
    let LearnOutcome::Stored(StoreOutcome::Inserted(pattern_id)) =
        engine.complete_session("s1", true)
    else {
        panic!("expected stored pattern");
    };

    let verdict = QaVerdict {
        gate_decision: GateDecision::Fail,
        blocking_issues: vec!["critical security regression in auth flow".into()],
        security_checklist: Some(false),
        testing: Some(false),
    };
    let feedback_context = FeedbackContext {
        pattern_id: Some(pattern_id.clone()),
        story: Some("stories/auth.md".into()),
        action: Some("deploy without review".into()),
    };

    for _ in 0..3 {
        engine.process_qa_result(&verdict, &feedback_context);
    }

    let pattern = engine.patterns().get(&pattern_id).unwrap();
    assert_eq!(pattern.status, PatternStatus::Deprecated);
    assert!(pattern.confidence >= 0.0);
    assert!(!engine.gotchas().is_empty());

    // The deprecated pattern no longer influences suggestions, but the
    // gotcha is queryable.
    let matches = engine.query_gotchas("deploy without review stories/auth.md");
    assert!(!matches.is_empty());
}

#[tokio::test]
async fn stores_round_trip_across_engine_restarts() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir).await;

    let pattern_id = {
        let mut engine = Engine::new(config.clone()).await.unwrap();
        engine.observe_command("s1", "create-story", Some("sm"));
        engine.observe_command("s1", "develop-story", Some("dev"));
        engine.observe_command("s1", "run-tests", Some("dev"));
        let LearnOutcome::Stored(StoreOutcome::Inserted(id)) = engine.complete_session("s1", true)
        else {
            panic!("expected stored pattern");
        };
        engine.persist().await.unwrap();
        id
    };

    let engine = Engine::new(config).await.unwrap();
    let pattern = engine.patterns().get(&pattern_id).unwrap();
    assert_eq!(pattern.sequence, vec!["create-story", "develop-story", "run-tests"]);
    assert_eq!(pattern.occurrences, 1);
}

#[tokio::test]
async fn semantic_search_finds_learned_patterns() {
    let dir = TempDir::new().unwrap();
    let mut engine = Engine::new(test_config(&dir).await).await.unwrap();

    engine.observe_command("s1", "create-story", Some("sm"));
    engine.observe_command("s1", "develop-story", Some("dev"));
    engine.observe_command("s1", "run-tests", Some("dev"));
    engine.complete_session("s1", true);

    // Synonym-aware: "make" maps onto "create".
    let hits = engine.search_patterns("make story", 5);
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn missing_definitions_file_degrades_but_does_not_crash() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.registry.definitions_path = PathBuf::from(dir.path().join("missing.yaml"));
    config.store.patterns_path = dir.path().join("patterns.json");
    config.store.gotchas_path = dir.path().join("gotchas.json");
    config.store.feedback_path = dir.path().join("feedback.json");

    let engine = Engine::new(config).await.unwrap();
    let result = engine.suggest_next(&context_after(&["create-story"])).await;

    assert!(result.message.is_some());
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn corrupt_pattern_store_treated_as_empty() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir).await;
    tokio::fs::write(&config.store.patterns_path, "{broken json").await.unwrap();

    let engine = Engine::new(config).await.unwrap();
    assert!(engine.patterns().is_empty());
}

#[tokio::test]
async fn session_context_built_from_log() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir).await;

    let log_path = dir.path().join("session.json");
    tokio::fs::write(
        &log_path,
        r#"{"last_commands":["create-epic","create-story"],"current_story":"stories/auth.md","workflow_active":true}"#,
    )
    .await
    .unwrap();
    config.suggest.session_log_path = Some(log_path);

    let engine = Engine::new(config).await.unwrap();
    let context = engine
        .build_context(ContextOptions { agent_id: Some("dev".into()), ..Default::default() })
        .await;

    assert_eq!(context.last_command.as_deref(), Some("create-story"));
    assert_eq!(context.story_path, Some(PathBuf::from("stories/auth.md")));

    let result = engine.suggest_next(&context).await;
    assert_eq!(result.workflow.as_deref(), Some("epic-creation"));
}

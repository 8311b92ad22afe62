//! Whole-pipeline scenarios against an in-memory session store and a
//! recording decisions store. No model is configured, so every turn runs on
//! the deterministic paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use decision_qa::{
    AskRequest, DecisionStore, InMemorySessionStore, Intent, LLMManager, Orchestrator, PipelineState, QaConfig,
    QaError, QaResult, ResponseKind, Row, SessionStore, SqlParam,
};

type Responder = Box<dyn Fn(&str, &[SqlParam]) -> QaResult<Vec<Row>> + Send + Sync>;

struct RecordingStore {
    calls: Mutex<Vec<(String, Vec<SqlParam>)>>,
    delay: Duration,
    respond: Responder,
}

impl RecordingStore {
    fn new(respond: impl Fn(&str, &[SqlParam]) -> QaResult<Vec<Row>> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            respond: Box::new(respond),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
            respond: Box::new(|_, _| Ok(Vec::new())),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn last_call(&self) -> (String, Vec<SqlParam>) {
        self.calls.lock().last().cloned().expect("store was called")
    }
}

#[async_trait]
impl DecisionStore for RecordingStore {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> QaResult<Vec<Row>> {
        self.calls.lock().push((sql.to_string(), params.to_vec()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(sql, params)
    }

    async fn ping(&self) -> QaResult<()> {
        Ok(())
    }
}

fn decision(number: &str, government: i64, title: &str) -> Row {
    json!({
        "decision_number": number,
        "government_number": government,
        "decision_date": "2022-06-01",
        "decision_title": title,
        "summary": "",
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn orchestrator_with(config: QaConfig, store: Arc<RecordingStore>) -> Orchestrator {
    let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(600)));
    Orchestrator::new(&config, LLMManager::disabled(), sessions, store)
}

fn orchestrator(store: Arc<RecordingStore>) -> Orchestrator {
    orchestrator_with(QaConfig::default(), store)
}

async fn ask(orchestrator: &Orchestrator, session: &str, text: &str) -> decision_qa::AskResponse {
    orchestrator.ask(AskRequest::new(text).in_session(session)).await
}

#[tokio::test]
async fn test_count_question_is_answered_with_a_number() {
    let store = RecordingStore::new(|sql, _| {
        assert!(sql.contains("COUNT(*)"));
        Ok(vec![json!({"decision_count": 42}).as_object().cloned().unwrap()])
    });
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s1", "how many decisions about education did government 37 make").await;

    assert_eq!(answer.state, PipelineState::Primary);
    assert_eq!(answer.response.kind, ResponseKind::Count);
    assert_eq!(answer.response.text, "There are 42 decisions on חינוך by government 37.");
    assert_eq!(answer.response.metadata.intent, Some(Intent::Statistical));
    assert_eq!(answer.response.metadata.entities.government_number, Some(37));

    let (_, params) = store.last_call();
    assert!(params.contains(&SqlParam::Int(37)));
    assert!(params
        .iter()
        .any(|p| matches!(p, SqlParam::Text(t) if t.contains("חינוך"))));
}

#[tokio::test]
async fn test_identifier_without_government_is_not_filtered_by_previous_government() {
    let store = RecordingStore::new(|sql, _| {
        if sql.contains("government_number = $") {
            Ok(vec![decision("12", 5, "from government 5")])
        } else {
            Ok(vec![
                decision("12", 37, "from government 37"),
                decision("12", 36, "from government 36"),
                decision("12", 5, "from government 5"),
            ])
        }
    });
    let orchestrator = orchestrator(store.clone());

    let first = ask(&orchestrator, "s2", "decision number 12 of government 5").await;
    assert_eq!(first.response.kind, ResponseKind::Detail);
    let (_, params) = store.last_call();
    assert!(params.contains(&SqlParam::Int(5)));

    let second = ask(&orchestrator, "s2", "decision number 12").await;
    let (sql, params) = store.last_call();
    assert!(!sql.contains("government_number = $"));
    assert!(!params.contains(&SqlParam::Int(5)));
    assert_eq!(second.response.kind, ResponseKind::List);
    assert_eq!(second.response.metadata.row_count, 3);
    assert_eq!(second.response.metadata.entities.government_number, None);
}

#[tokio::test]
async fn test_unclear_turn_never_reaches_the_store() {
    let store = RecordingStore::new(|_, _| Ok(Vec::new()));
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s3", "hello there").await;

    assert_eq!(answer.response.kind, ResponseKind::Clarification);
    assert_eq!(answer.state, PipelineState::Primary);
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_confidence_gate_routes_to_clarification() {
    let store = RecordingStore::new(|_, _| Ok(Vec::new()));
    let mut config = QaConfig::default();
    config.pipeline.confidence_threshold = 0.95;
    let orchestrator = orchestrator_with(config, store.clone());

    let answer = ask(&orchestrator, "s4", "how many decisions about education").await;

    assert_eq!(answer.response.kind, ResponseKind::Clarification);
    assert_eq!(answer.response.metadata.intent, Some(Intent::Unclear));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_zero_rows_is_an_explicit_no_results_answer() {
    let store = RecordingStore::new(|_, _| Ok(Vec::new()));
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s5", "show decisions about education by government 12").await;

    assert_eq!(answer.state, PipelineState::Primary);
    assert_eq!(answer.response.kind, ResponseKind::NoResults);
    assert!(answer.response.text.starts_with("No decisions matched"));
    assert_eq!(store.call_count(), 1);
}

#[tokio::test]
async fn test_ordinal_reference_resolves_against_last_results() {
    let store = RecordingStore::new(|sql, _| {
        if sql.contains("government_number = $") {
            Ok(vec![decision("200", 37, "B")])
        } else {
            Ok(vec![
                decision("100", 37, "A"),
                decision("200", 37, "B"),
                decision("300", 37, "C"),
            ])
        }
    });
    let orchestrator = orchestrator(store.clone());

    let listed = ask(&orchestrator, "s6", "show the 3 latest decisions").await;
    assert_eq!(listed.response.kind, ResponseKind::List);

    let followup = ask(&orchestrator, "s6", "show me the second one").await;
    let (_, params) = store.last_call();
    assert!(params.contains(&SqlParam::Text("200".to_string())));
    assert!(params.contains(&SqlParam::Int(37)));
    assert_eq!(followup.response.kind, ResponseKind::Detail);
    assert_eq!(followup.response.metadata.entities.decision_number, Some(200));
}

#[tokio::test]
async fn test_cache_is_invalidated_when_the_identifier_changes() {
    let store = RecordingStore::new(|_, params| {
        let number = params
            .iter()
            .find_map(|p| match p {
                SqlParam::Text(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(vec![decision(&number, 37, "record")])
    });
    let orchestrator = orchestrator(store.clone());

    let first = ask(&orchestrator, "s7", "decision number 12").await;
    let repeat = ask(&orchestrator, "s7", "decision number 12").await;
    assert!(!first.response.metadata.cached);
    assert!(repeat.response.metadata.cached);
    assert_eq!(first.response.metadata.entities, repeat.response.metadata.entities);
    assert_eq!(store.call_count(), 1);

    let other = ask(&orchestrator, "s7", "decision number 13").await;
    assert!(!other.response.metadata.cached);
    assert_eq!(store.call_count(), 2);

    let back = ask(&orchestrator, "s7", "decision number 12").await;
    assert!(!back.response.metadata.cached);
    assert_eq!(store.call_count(), 3);
}

#[tokio::test]
async fn test_cached_answer_restores_the_list_references_resolve_against() {
    let store = RecordingStore::new(|sql, params| {
        if sql.contains("government_number = $") {
            let number = params
                .iter()
                .find_map(|p| match p {
                    SqlParam::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            return Ok(vec![decision(&number, 37, "record")]);
        }
        let numbers = if format!("{:?}", params).contains("2020") {
            ["100", "200", "300"]
        } else {
            ["800", "900", "950"]
        };
        Ok(numbers.iter().map(|n| decision(n, 37, "record")).collect())
    });
    let mut config = QaConfig::default();
    config.pipeline.enable_ranking = false;
    let orchestrator = orchestrator_with(config, store.clone());

    let first = ask(&orchestrator, "s12", "show education decisions in 2020").await;
    assert_eq!(first.response.kind, ResponseKind::List);
    ask(&orchestrator, "s12", "show education decisions in 2021").await;
    let again = ask(&orchestrator, "s12", "show education decisions in 2020").await;
    assert!(again.response.metadata.cached);
    let calls_before_followup = store.call_count();

    let followup = ask(&orchestrator, "s12", "show me the second one").await;
    assert_eq!(store.call_count(), calls_before_followup + 1);
    let (_, params) = store.last_call();
    assert!(params.contains(&SqlParam::Text("200".to_string())));
    assert_eq!(followup.response.metadata.entities.decision_number, Some(200));
}

#[tokio::test]
async fn test_unmatched_question_falls_back_to_keyword_search() {
    let store = RecordingStore::new(|sql, _| {
        assert!(sql.contains("ILIKE"));
        Ok(vec![decision("7", 37, "monthly report")])
    });
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s8", "average decisions per month").await;

    assert_eq!(answer.state, PipelineState::LegacyFallback);
    assert_eq!(answer.transitions.len(), 1);
    assert_eq!(answer.transitions[0].from, PipelineState::Primary);
    assert_eq!(answer.transitions[0].reason, "upstream_unavailable (compiler)");
    assert_eq!(answer.response.metadata.provenance.as_deref(), Some("legacy"));
}

#[tokio::test]
async fn test_execution_errors_never_leak_to_the_user() {
    let store = RecordingStore::new(|_, _| {
        Err(QaError::Execution("syntax error at or near \"SELECT\" in israeli_government_decisions".into()))
    });
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s9", "decision number 12").await;

    assert_eq!(answer.state, PipelineState::Failed);
    assert_eq!(answer.transitions.len(), 2);
    assert_eq!(answer.response.kind, ResponseKind::Error);
    assert!(!answer.response.text.contains("SELECT"));
    assert!(!answer.response.text.contains("israeli_government_decisions"));
    assert!(answer.transitions.iter().all(|t| !t.reason.contains("SELECT")));
}

#[tokio::test]
async fn test_store_outage_fails_without_legacy_attempt() {
    let store = RecordingStore::new(|_, _| Err(QaError::Store("pool timed out".into())));
    let orchestrator = orchestrator(store.clone());

    let answer = ask(&orchestrator, "s10", "decision number 12").await;

    assert_eq!(answer.state, PipelineState::Failed);
    assert_eq!(answer.transitions.len(), 1);
    assert_eq!(store.call_count(), 1);
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let store = RecordingStore::slow(Duration::from_millis(300));
    let mut config = QaConfig::default();
    config.pipeline.stage_timeout_ms = 50;
    config.pipeline.turn_timeout_ms = 1_000;
    let orchestrator = orchestrator_with(config, store);

    let answer = ask(&orchestrator, "s11", "decision number 12").await;

    assert_eq!(answer.state, PipelineState::Failed);
    assert_eq!(answer.response.kind, ResponseKind::Error);
    assert!(answer.response.text.contains("too long"));
    assert!(answer.transitions[0].reason.starts_with("upstream_timeout"));
}

#[tokio::test]
async fn test_turns_on_one_session_are_serialised() {
    let store = RecordingStore::new(|_, _| Ok(vec![decision("12", 37, "record")]));
    let orchestrator = Arc::new(orchestrator(store));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .ask(AskRequest::new("decision number 12").in_session("shared"))
                .await
        }));
    }
    for handle in handles {
        let answer = handle.await.unwrap();
        assert_eq!(answer.session_id, "shared");
    }

    let state = orchestrator.router().store().get("shared").await.unwrap().unwrap();
    assert_eq!(state.turns.len(), 10);
}

#[tokio::test]
async fn test_new_session_id_is_issued() {
    let store = RecordingStore::new(|_, _| Ok(Vec::new()));
    let orchestrator = orchestrator(store);

    let answer = orchestrator.ask(AskRequest::new("hello there")).await;

    assert!(!answer.session_id.is_empty());
    assert!(answer
        .response
        .metadata
        .stage_timings
        .iter()
        .any(|t| t.stage == "classifier"));
}

use super::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use frontdesk_core::config::ExtractionConfig;
use frontdesk_core::extraction::{ExtractionAgent, ExtractionError, ExtractionRequest};
use frontdesk_core::handler::HandlerError;
use frontdesk_core::schema::SchemaRegistry;
use frontdesk_core::session::{IdentifierKey, MessageRole, SlotKey, StateMutation};
use frontdesk_infrastructure::MemorySessionStore;
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Mocks
// ============================================================================

struct MockHandler {
    results: Mutex<Vec<std::result::Result<Value, HandlerError>>>,
    invocations: Mutex<Vec<HandlerInvocation>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHandler {
    /// Returns the scripted results in order, then `{}`.
    fn scripted(results: Vec<std::result::Result<Value, HandlerError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results),
            invocations: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
            delay: Some(delay),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn invocations(&self) -> Vec<HandlerInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionHandler for MockHandler {
    async fn handle(
        &self,
        invocation: &HandlerInvocation,
    ) -> std::result::Result<Value, HandlerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(invocation.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(json!({}))
        } else {
            results.remove(0)
        }
    }
}

#[derive(Default)]
struct MockSink {
    records: Mutex<Vec<(Option<String>, CallRecord)>>,
}

impl LedgerSink for MockSink {
    fn publish(&self, session_id: Option<&str>, record: &CallRecord) {
        self.records
            .lock()
            .unwrap()
            .push((session_id.map(str::to_string), record.clone()));
    }
}

struct MockAgent {
    response: std::result::Result<String, ExtractionError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

#[async_trait]
impl ExtractionAgent for MockAgent {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn extract(
        &self,
        _request: &ExtractionRequest,
    ) -> std::result::Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }
}

/// Reads through to memory but rejects every write.
#[derive(Default)]
struct ReadOnlyStore {
    inner: MemorySessionStore,
}

#[async_trait]
impl SessionStore for ReadOnlyStore {
    async fn get(&self, session_id: &str) -> Result<ConversationState> {
        self.inner.get(session_id).await
    }

    async fn update<'a>(
        &self,
        _session_id: &str,
        _mutation: StateMutation<'a>,
    ) -> Result<ConversationState> {
        Err(FrontdeskError::system("store is read-only"))
    }

    async fn find(&self, session_id: &str) -> Result<Option<ConversationState>> {
        self.inner.find(session_id).await
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        self.inner.session_ids().await
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    store: Arc<MemorySessionStore>,
    handler: Arc<MockHandler>,
    sink: Arc<MockSink>,
    use_case: FunctionCallUseCase,
}

fn fixture(handler: Arc<MockHandler>, agent: Option<Arc<MockAgent>>) -> Fixture {
    let store = Arc::new(MemorySessionStore::new());
    let sink = Arc::new(MockSink::default());
    let fallback = ExtractionFallback::new(
        store.clone(),
        agent.map(|a| a as Arc<dyn ExtractionAgent>),
        ExtractionConfig {
            timeout_ms: 50,
            ..Default::default()
        },
    );
    let use_case = FunctionCallUseCase::new(
        store.clone(),
        Arc::new(SessionGate::new()),
        handler.clone(),
        fallback,
        sink.clone(),
        Arc::new(|| NaiveDate::from_ymd_opt(2025, 12, 3).unwrap()),
    );
    Fixture {
        store,
        handler,
        sink,
        use_case,
    }
}

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

async fn say(store: &MemorySessionStore, session_id: &str, role: MessageRole, content: &str) {
    let content = content.to_string();
    store
        .update(
            session_id,
            Box::new(move |state: &mut ConversationState| {
                state.push_message(role, content);
            }),
        )
        .await
        .unwrap();
}

fn create_patient_request(session_id: &str) -> FunctionCallRequest {
    FunctionCallRequest::new(
        "CreatePatient",
        params(json!({
            "FName": "Ana",
            "LName": "Perez",
            "Birthdate": "1988-08-12",
        })),
    )
    .with_session(session_id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_spoken_phone_is_recovered_from_the_session_transcript() {
    let f = fixture(MockHandler::scripted(vec![Ok(json!({ "PatNum": 7 }))]), None);
    say(&f.store, "call-1", MessageRole::Assistant, "What number can we reach you at?").await;
    say(
        &f.store,
        "call-1",
        MessageRole::User,
        "my number is six one nine five five five one two three four",
    )
    .await;

    let response = f
        .use_case
        .execute(create_patient_request("call-1"), CancellationToken::new())
        .await;

    let FunctionCallResponse::Success {
        result,
        auto_filled,
        extraction,
    } = response
    else {
        panic!("expected success, got {:?}", response);
    };
    assert_eq!(result, json!({ "PatNum": 7 }));
    assert_eq!(auto_filled, vec!["WirelessPhone"]);
    let extraction = extraction.unwrap();
    assert!(extraction.attempted);
    assert!(extraction.revalidated);
    assert_eq!(extraction.filled, vec!["WirelessPhone"]);

    let invocation = &f.handler.invocations()[0];
    assert_eq!(invocation.parameters.get("WirelessPhone"), Some(&json!("6195551234")));
    assert!(matches!(invocation.call, Some(FunctionCall::CreatePatient(_))));

    let state = f.store.get("call-1").await.unwrap();
    assert_eq!(state.identifiers().value(IdentifierKey::PatientId), Some(7));
    assert_eq!(state.call_log().len(), 1);
    assert!(state.call_log()[0].extraction.is_some());
}

#[tokio::test]
async fn test_model_fallback_uses_the_supplied_history() {
    let agent = Arc::new(MockAgent {
        response: Ok(r#"{"WirelessPhone": "6195551234"}"#.to_string()),
        delay: None,
        calls: AtomicUsize::new(0),
    });
    let f = fixture(MockHandler::scripted(vec![Ok(json!({ "PatNum": 8 }))]), Some(agent.clone()));

    let request = create_patient_request("call-2").with_history(vec![TranscriptLine {
        role: MessageRole::User,
        content: "it's six one nine, five five five, twelve thirty-four".into(),
    }]);
    let response = f.use_case.execute(request, CancellationToken::new()).await;

    assert!(response.is_success(), "{:?}", response);
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        f.handler.invocations()[0].parameters.get("WirelessPhone"),
        Some(&json!("6195551234"))
    );
    // History is only a transcript for extraction, never ingested.
    assert!(f.store.get("call-2").await.unwrap().messages().is_empty());
}

#[tokio::test]
async fn test_extraction_timeout_returns_the_original_validation_error() {
    let agent = Arc::new(MockAgent {
        response: Ok("{}".to_string()),
        delay: Some(Duration::from_secs(5)),
        calls: AtomicUsize::new(0),
    });
    let f = fixture(MockHandler::scripted(Vec::new()), Some(agent));
    say(&f.store, "call-3", MessageRole::User, "please use my cell").await;

    let response = f
        .use_case
        .execute(create_patient_request("call-3"), CancellationToken::new())
        .await;

    let FunctionCallResponse::ValidationFailed(body) = response else {
        panic!("expected validation failure, got {:?}", response);
    };
    assert!(body.extraction_attempted);
    assert_eq!(body.details.missing_fields, vec!["WirelessPhone"]);
    assert_eq!(
        body.extraction.as_ref().and_then(|r| r.error.clone()),
        Some(ExtractionError::Timeout { after_ms: 50 })
    );
    assert!(f.handler.invocations().is_empty());

    let state = f.store.get("call-3").await.unwrap();
    assert_eq!(state.call_log().len(), 1);
    assert_eq!(
        state.call_log()[0].outcome.category(),
        Some(frontdesk_core::ErrorCategory::Validation)
    );
}

#[tokio::test]
async fn test_authoritative_patient_id_overrides_caller_value() {
    let f = fixture(
        MockHandler::scripted(vec![Ok(json!({ "PatNum": 7 })), Ok(json!({ "AptNum": 42 }))]),
        None,
    );
    let created = f
        .use_case
        .execute(
            FunctionCallRequest::new(
                "CreatePatient",
                params(json!({
                    "FName": "Ana",
                    "LName": "Perez",
                    "Birthdate": "1988-08-12",
                    "WirelessPhone": "619-555-1234",
                })),
            )
            .with_session("call-4"),
            CancellationToken::new(),
        )
        .await;
    assert!(created.is_success());

    let booked = f
        .use_case
        .execute(
            FunctionCallRequest::new(
                "CreateAppointment",
                params(json!({
                    "PatNum": 99,
                    "AptDateTime": "2025-12-05 10:00:00",
                    "ProvNum": 1,
                    "Op": 2,
                })),
            )
            .with_session("call-4"),
            CancellationToken::new(),
        )
        .await;
    assert!(booked.is_success(), "{:?}", booked);

    let invocation = &f.handler.invocations()[1];
    assert_eq!(invocation.parameters.get("PatNum"), Some(&json!(7)));

    let state = f.store.get("call-4").await.unwrap();
    assert_eq!(state.override_events().len(), 1);
    assert_eq!(state.override_events()[0].kept, Some(7));
    assert_eq!(state.override_events()[0].discarded, "99");
    assert_eq!(state.identifiers().value(IdentifierKey::AppointmentId), Some(42));
    assert_eq!(state.call_log().len(), 2);
}

#[tokio::test]
async fn test_sessionless_validation_failure_is_published_only() {
    let f = fixture(MockHandler::scripted(Vec::new()), None);

    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new("CreateAppointment", Params::new()),
            CancellationToken::new(),
        )
        .await;

    let FunctionCallResponse::ValidationFailed(body) = response else {
        panic!("expected validation failure");
    };
    assert!(!body.extraction_attempted);
    assert!(f.handler.invocations().is_empty());

    let records = f.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, None);
    assert!(matches!(
        records[0].1.outcome,
        CallOutcome::ValidationFailed { .. }
    ));
}

#[tokio::test]
async fn test_handler_failure_is_recorded() {
    let f = fixture(
        MockHandler::scripted(vec![Err(HandlerError::failed("slot already taken"))]),
        None,
    );
    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new("CancelAppointment", params(json!({ "AptNum": "42" })))
                .with_session("call-5"),
            CancellationToken::new(),
        )
        .await;

    let FunctionCallResponse::HandlerFailed(body) = response else {
        panic!("expected handler failure");
    };
    assert_eq!(body.function_name, "CancelAppointment");
    assert_eq!(body.message, "slot already taken");

    let state = f.store.get("call-5").await.unwrap();
    assert!(matches!(
        state.call_log()[0].outcome,
        CallOutcome::HandlerFailed { .. }
    ));
    assert_eq!(f.sink.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_handler_receives_canonical_declared_params_only() {
    let f = fixture(MockHandler::scripted(Vec::new()), None);
    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new(
                "CancelAppointment",
                params(json!({ "AptNum": "42", "Reason": "travel", "Confirmed": true })),
            ),
            CancellationToken::new(),
        )
        .await;
    assert!(response.is_success());

    let invocation = &f.handler.invocations()[0];
    assert_eq!(
        Value::Object(invocation.parameters.clone()),
        json!({ "AptNum": 42, "Reason": "travel", "SendToUnscheduledList": true })
    );
}

#[tokio::test]
async fn test_unregistered_function_passes_through() {
    let f = fixture(MockHandler::scripted(vec![Ok(json!({ "open": "8am" }))]), None);
    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new("GetClinicHours", params(json!({ "day": "monday" }))),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(
        response,
        FunctionCallResponse::Success {
            result: json!({ "open": "8am" }),
            auto_filled: Vec::new(),
            extraction: None,
        }
    );
    let invocation = &f.handler.invocations()[0];
    assert_eq!(invocation.parameters.get("day"), Some(&json!("monday")));
    assert!(invocation.call.is_none());
}

#[tokio::test]
async fn test_cancelled_request_is_a_system_failure() {
    let f = fixture(MockHandler::slow(Duration::from_secs(5)), None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new("CancelAppointment", params(json!({ "AptNum": 42 })))
                .with_session("call-6"),
            cancel,
        )
        .await;

    assert!(matches!(response, FunctionCallResponse::SystemFailed(_)));
    let state = f.store.get("call-6").await.unwrap();
    assert!(matches!(
        state.call_log()[0].outcome,
        CallOutcome::SystemFailed { .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_session_requests_are_serialized() {
    let f = Arc::new(fixture(MockHandler::slow(Duration::from_millis(30)), None));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let f = f.clone();
        tasks.push(tokio::spawn(async move {
            f.use_case
                .execute(
                    FunctionCallRequest::new(
                        "CancelAppointment",
                        params(json!({ "AptNum": 40 + i })),
                    )
                    .with_session("shared"),
                    CancellationToken::new(),
                )
                .await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_success());
    }

    assert_eq!(f.handler.max_in_flight.load(Ordering::SeqCst), 1);
    let state = f.store.get("shared").await.unwrap();
    assert_eq!(state.call_log().len(), 4);
    assert_eq!(state.slots().value(SlotKey::Phone), None);
}

#[tokio::test]
async fn test_search_without_strategy_recovers_phone_from_history() {
    let f = fixture(MockHandler::scripted(vec![Ok(json!([{ "PatNum": 7 }]))]), None);

    let request = FunctionCallRequest::new("SearchPatients", Params::new())
        .with_session("call-10")
        .with_history(vec![TranscriptLine {
            role: MessageRole::User,
            content: "my number is 619-555-1234".into(),
        }]);
    let response = f.use_case.execute(request, CancellationToken::new()).await;

    let FunctionCallResponse::Success { extraction, .. } = response else {
        panic!("expected success, got {:?}", response);
    };
    let extraction = extraction.unwrap();
    assert!(extraction.attempted);
    assert!(extraction.revalidated);
    assert!(!extraction.model_called);
    assert_eq!(extraction.filled, vec!["Phone"]);
    assert_eq!(
        f.handler.invocations()[0].parameters.get("Phone"),
        Some(&json!("6195551234"))
    );
}

#[tokio::test]
async fn test_search_without_strategy_asks_the_model_once() {
    let agent = Arc::new(MockAgent {
        response: Ok(r#"{"Phone": "619-555-1234"}"#.to_string()),
        delay: None,
        calls: AtomicUsize::new(0),
    });
    let f = fixture(MockHandler::scripted(Vec::new()), Some(agent.clone()));

    let request = FunctionCallRequest::new("SearchPatients", Params::new())
        .with_session("call-11")
        .with_history(vec![TranscriptLine {
            role: MessageRole::User,
            content: "it's six one nine, five five five, twelve thirty-four".into(),
        }]);
    let response = f.use_case.execute(request, CancellationToken::new()).await;

    assert!(response.is_success(), "{:?}", response);
    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        f.handler.invocations()[0].parameters.get("Phone"),
        Some(&json!("6195551234"))
    );
}

#[tokio::test]
async fn test_ledger_write_failure_keeps_the_handler_success() {
    let store = Arc::new(ReadOnlyStore::default());
    let handler = MockHandler::scripted(vec![Ok(json!({ "cancelled": true }))]);
    let sink = Arc::new(MockSink::default());
    let use_case = FunctionCallUseCase::new(
        store.clone(),
        Arc::new(SessionGate::new()),
        handler.clone(),
        ExtractionFallback::new(store.clone(), None, ExtractionConfig::default()),
        sink.clone(),
        Arc::new(|| NaiveDate::from_ymd_opt(2025, 12, 3).unwrap()),
    );

    let cancelled = use_case
        .execute(
            FunctionCallRequest::new("CancelAppointment", params(json!({ "AptNum": 42 })))
                .with_session("call-12"),
            CancellationToken::new(),
        )
        .await;
    let FunctionCallResponse::Success { result, .. } = cancelled else {
        panic!("expected success, got {:?}", cancelled);
    };
    assert_eq!(result, json!({ "cancelled": true }));
    assert_eq!(handler.invocations().len(), 1);

    // Nothing acted, so an unrecorded failure is a system failure.
    let rejected = use_case
        .execute(
            FunctionCallRequest::new("CancelAppointment", Params::new()).with_session("call-12"),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(rejected, FunctionCallResponse::SystemFailed(_)));

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0].1.outcome, CallOutcome::Success { .. }));
}

#[tokio::test]
async fn test_system_failure_records_resolved_params_and_overrides() {
    let f = fixture(MockHandler::slow(Duration::from_secs(5)), None);
    f.store
        .update(
            "call-13",
            Box::new(|state: &mut ConversationState| {
                let created = CallRecord::new(
                    "CreatePatient",
                    Params::new(),
                    Vec::new(),
                    CallOutcome::Success {
                        result: json!({ "PatNum": 7 }),
                    },
                );
                ledger::record(state, created, SchemaRegistry::get("CreatePatient"));
            }),
        )
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = f
        .use_case
        .execute(
            FunctionCallRequest::new(
                "CreateAppointment",
                params(json!({
                    "PatNum": 99,
                    "AptDateTime": "2025-12-05 10:00:00",
                    "ProvNum": 1,
                    "Op": 2,
                })),
            )
            .with_session("call-13"),
            cancel,
        )
        .await;
    assert!(matches!(response, FunctionCallResponse::SystemFailed(_)));

    let state = f.store.get("call-13").await.unwrap();
    let failed = &state.call_log()[1];
    assert!(matches!(failed.outcome, CallOutcome::SystemFailed { .. }));
    assert_eq!(failed.resolved_parameters.get("PatNum"), Some(&json!(7)));
    assert_eq!(state.override_events().len(), 1);
    assert_eq!(state.override_events()[0].discarded, "99");
}

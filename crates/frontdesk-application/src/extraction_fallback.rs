//! LLM extraction fallback.
//!
//! Runs at most once per function call, after validation reported missing
//! fields or unmet alternatives the conversation could supply. A deterministic pass over the
//! caller's turns goes first; the external model is only asked for what
//! is still missing after that.

use chrono::NaiveDate;
use frontdesk_core::config::ExtractionConfig;
use frontdesk_core::extraction::{
    DeterministicExtractor, ExtractionAgent, ExtractionError, ExtractionReport, ExtractionRequest,
    TranscriptLine, parse_response,
};
use frontdesk_core::params::value_as_text;
use frontdesk_core::schema::{Field, FunctionSchema, SlotBinding, split_date_time};
use frontdesk_core::session::{
    ConversationState, MessageRole, SessionStore, SlotKey, SlotPatch, SlotSource,
};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Inputs for one fallback run.
pub struct FallbackInput<'a> {
    pub session_id: &'a str,
    pub schema: &'static FunctionSchema,
    /// Wire names reported missing by the first validation
    pub missing_fields: &'a [String],
    /// Disjunctive groups of which none is satisfied, by wire name
    pub alternatives: &'a [Vec<String>],
    pub transcript: &'a [TranscriptLine],
    pub today: NaiveDate,
}

/// Fills missing slots from the conversation transcript.
///
/// # Responsibilities
///
/// - Restrict extraction to missing, non-critical, conversation-bound fields
/// - Prefer the deterministic extractor over the model
/// - Bound the model call by the configured timeout and the request's
///   cancellation token
/// - Merge results with `FillEmpty` precedence so nothing the session already
///   holds is overwritten
///
/// Never fails: every problem is reported in the returned
/// [`ExtractionReport`] and the caller surfaces the original validation
/// error.
pub struct ExtractionFallback {
    store: Arc<dyn SessionStore>,
    agent: Option<Arc<dyn ExtractionAgent>>,
    config: ExtractionConfig,
    extractor: DeterministicExtractor,
}

impl ExtractionFallback {
    pub fn new(
        store: Arc<dyn SessionStore>,
        agent: Option<Arc<dyn ExtractionAgent>>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            agent,
            config,
            extractor: DeterministicExtractor::new(),
        }
    }

    /// Fields of `input` the fallback may try to fill: missing fields plus
    /// every member of an open disjunctive group.
    pub fn extractable_fields(input: &FallbackInput<'_>) -> Vec<Field> {
        let mut fields = Vec::new();
        for name in input
            .missing_fields
            .iter()
            .chain(input.alternatives.iter().flatten())
        {
            let Ok(field) = Field::from_str(name) else {
                continue;
            };
            if input.schema.is_extractable(field) && !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// Runs the fallback. Returns `None` when none of the missing fields is
    /// extractable, in which case nothing was attempted.
    pub async fn run(
        &self,
        input: FallbackInput<'_>,
        cancel: &CancellationToken,
    ) -> Option<ExtractionReport> {
        let fields = Self::extractable_fields(&input);
        if fields.is_empty() {
            tracing::debug!(
                "[ExtractionFallback] {}: no extractable field among {:?} / {:?}",
                input.schema.name(),
                input.missing_fields,
                input.alternatives
            );
            return None;
        }
        if input.transcript.is_empty() {
            return Some(ExtractionReport {
                error: Some(ExtractionError::NoTranscript),
                ..Default::default()
            });
        }

        let mut report = ExtractionReport {
            attempted: true,
            ..Default::default()
        };
        match self.fill(&input, &fields, &mut report, cancel).await {
            Ok(()) => {}
            Err(error) => {
                tracing::warn!(
                    "[ExtractionFallback] session={} {}: {}",
                    input.session_id,
                    input.schema.name(),
                    error
                );
                report.error = Some(error);
            }
        }

        tracing::info!(
            "[ExtractionFallback] session={} {} filled={:?} model_called={}",
            input.session_id,
            input.schema.name(),
            report.filled,
            report.model_called
        );
        Some(report)
    }

    async fn fill(
        &self,
        input: &FallbackInput<'_>,
        fields: &[Field],
        report: &mut ExtractionReport,
        cancel: &CancellationToken,
    ) -> Result<(), ExtractionError> {
        let before = self.snapshot(input.session_id).await?;
        let pending: Vec<Field> = fields
            .iter()
            .copied()
            .filter(|field| !is_satisfied(&before, input.schema, *field))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        // Deterministic pass over the caller's own turns.
        let window = self.window(input.transcript);
        let wanted = bound_slots(input.schema, &pending);
        let facts = self.scan_transcript(window, input.today);
        let mut patch = SlotPatch::new(SlotSource::Deterministic);
        for (key, value) in facts {
            if wanted.contains(&key) {
                patch = patch.with_slot(key, value);
            }
        }
        let after = if patch.is_empty() {
            before
        } else {
            self.merge(input.session_id, &patch).await?
        };
        let remaining = collect_filled(&after, input.schema, &pending, report);
        if remaining.is_empty() || goal_met(&after, input) {
            return Ok(());
        }

        let agent = match &self.agent {
            Some(agent) if self.config.enabled => agent.clone(),
            _ => return Err(ExtractionError::Disabled),
        };

        let request = ExtractionRequest::new(
            input.schema,
            &remaining,
            input.transcript,
            self.config.transcript_window,
            input.today,
        );
        tracing::debug!(
            "[ExtractionFallback] asking {} for {:?}",
            agent.model_name(),
            request.field_names()
        );
        report.model_called = true;
        let raw = self.call_model(agent.as_ref(), &request, cancel).await?;
        let values = parse_response(&raw, &request, input.schema)?;

        let mut patch = SlotPatch::new(SlotSource::Llm);
        for (field, value) in &values {
            match input.schema.binding_for(*field) {
                Some(SlotBinding::Slot(key)) => {
                    if let Some(text) = value_as_text(value) {
                        patch = patch.with_slot(key, text);
                    }
                }
                Some(SlotBinding::DateTime { date, time }) => {
                    if let Some((d, t)) = value.as_str().and_then(split_date_time) {
                        patch = patch.with_slot(date, d).with_slot(time, t);
                    }
                }
                Some(SlotBinding::Identifier(_)) | None => {}
            }
        }
        if patch.is_empty() {
            return Err(ExtractionError::Empty);
        }
        let after = self.merge(input.session_id, &patch).await?;
        collect_filled(&after, input.schema, &remaining, report);
        Ok(())
    }

    async fn call_model(
        &self,
        agent: &dyn ExtractionAgent,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ExtractionError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        tokio::select! {
            _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
            result = tokio::time::timeout(timeout, agent.extract(request)) => match result {
                Ok(raw) => raw,
                Err(_) => Err(ExtractionError::Timeout {
                    after_ms: self.config.timeout_ms,
                }),
            },
        }
    }

    fn window<'t>(&self, transcript: &'t [TranscriptLine]) -> &'t [TranscriptLine] {
        let start = transcript
            .len()
            .saturating_sub(self.config.transcript_window);
        &transcript[start..]
    }

    /// Facts stated in user turns. A fact stated twice with different values
    /// is dropped unless the later turn is a correction.
    fn scan_transcript(
        &self,
        transcript: &[TranscriptLine],
        today: NaiveDate,
    ) -> BTreeMap<SlotKey, String> {
        let mut facts: BTreeMap<SlotKey, String> = BTreeMap::new();
        let mut conflicted: BTreeSet<SlotKey> = BTreeSet::new();

        for line in transcript.iter().filter(|l| l.role == MessageRole::User) {
            let extracted = self.extractor.extract(&line.content, today);
            for (key, value) in extracted.slots {
                match facts.get(&key) {
                    Some(existing) if *existing == value => {}
                    Some(_) if !extracted.is_correction => {
                        conflicted.insert(key);
                    }
                    _ => {
                        conflicted.remove(&key);
                        facts.insert(key, value);
                    }
                }
            }
        }

        facts.retain(|key, _| !conflicted.contains(key));
        facts
    }

    async fn snapshot(&self, session_id: &str) -> Result<ConversationState, ExtractionError> {
        self.store
            .get(session_id)
            .await
            .map_err(|e| ExtractionError::transport(format!("session store: {}", e)))
    }

    async fn merge(
        &self,
        session_id: &str,
        patch: &SlotPatch,
    ) -> Result<ConversationState, ExtractionError> {
        let (state, merge) = self
            .store
            .merge(session_id, patch)
            .await
            .map_err(|e| ExtractionError::transport(format!("session store: {}", e)))?;
        if !merge.skipped.is_empty() {
            tracing::debug!(
                "[ExtractionFallback] kept existing values for {:?}",
                merge.skipped.iter().map(|s| s.key).collect::<Vec<_>>()
            );
        }
        Ok(state)
    }
}

/// Slot keys behind `fields`.
fn bound_slots(schema: &FunctionSchema, fields: &[Field]) -> BTreeSet<SlotKey> {
    let mut keys = BTreeSet::new();
    for field in fields {
        match schema.binding_for(*field) {
            Some(SlotBinding::Slot(key)) => {
                keys.insert(key);
            }
            Some(SlotBinding::DateTime { date, time }) => {
                keys.insert(date);
                keys.insert(time);
            }
            Some(SlotBinding::Identifier(_)) | None => {}
        }
    }
    keys
}

fn is_satisfied(state: &ConversationState, schema: &FunctionSchema, field: Field) -> bool {
    match schema.binding_for(field) {
        Some(SlotBinding::Slot(key)) => state.slots().value(key).is_some(),
        Some(SlotBinding::DateTime { date, time }) => {
            state.slots().value(date).is_some() && state.slots().value(time).is_some()
        }
        Some(SlotBinding::Identifier(key)) => state.identifiers().value(key).is_some(),
        None => false,
    }
}

/// Every missing field is held and, when groups were open, one group is
/// complete. Other members of the open groups are then not worth a model call.
fn goal_met(state: &ConversationState, input: &FallbackInput<'_>) -> bool {
    let held = |name: &String| {
        Field::from_str(name).is_ok_and(|field| is_satisfied(state, input.schema, field))
    };
    input.missing_fields.iter().all(held)
        && (input.alternatives.is_empty()
            || input.alternatives.iter().any(|group| group.iter().all(held)))
}

/// Records newly satisfied fields in `report` and returns the rest.
fn collect_filled(
    state: &ConversationState,
    schema: &FunctionSchema,
    pending: &[Field],
    report: &mut ExtractionReport,
) -> Vec<Field> {
    let mut remaining = Vec::new();
    for field in pending {
        if is_satisfied(state, schema, *field) {
            report.filled.push(field.name().to_string());
        } else {
            remaining.push(*field);
        }
    }
    remaining
}

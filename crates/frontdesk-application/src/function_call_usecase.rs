//! Function-call pipeline.
//!
//! resolve -> validate -> (extract once -> resolve -> validate) -> dispatch
//! -> record. Every attempt ends in the call ledger, whatever its outcome.

use crate::Today;
use crate::extraction_fallback::{ExtractionFallback, FallbackInput};
use crate::session::SessionGate;
use frontdesk_core::call::{
    FunctionCallRequest, HandlerFailureBody, SystemFailureBody, ValidationFailureBody,
};
use frontdesk_core::error::{FrontdeskError, Result};
use frontdesk_core::extraction::{ExtractionReport, TranscriptLine};
use frontdesk_core::handler::{FunctionHandler, HandlerInvocation};
use frontdesk_core::ledger::{self, CallOutcome, CallRecord, LedgerSink};
use frontdesk_core::params::Params;
use frontdesk_core::resolver::{ParameterResolver, Resolution};
use frontdesk_core::schema::FunctionCall;
use frontdesk_core::session::{ConversationState, SessionStore};
use frontdesk_core::validator::{Validation, ValidationError, Validator};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one function call, ready to be rendered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCallResponse {
    /// The handler's raw result plus what the engine filled in
    Success {
        result: Value,
        auto_filled: Vec<String>,
        extraction: Option<ExtractionReport>,
    },
    ValidationFailed(Box<ValidationFailureBody>),
    HandlerFailed(HandlerFailureBody),
    SystemFailed(SystemFailureBody),
}

impl FunctionCallResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, FunctionCallResponse::Success { .. })
    }
}

/// Use case behind `POST /api/function-call`.
///
/// # Responsibilities
///
/// - Serialize requests per session through the [`SessionGate`]
/// - Resolve parameters against the session and record override events
/// - Validate, and on missing fields or unmet alternatives run the
///   extraction fallback once
/// - Forward only valid, typed calls to the handler
/// - Append a ledger record for every attempt and publish it to the sink
///
/// Requests without a session id skip slot filling and extraction, and
/// their records reach the sink only.
pub struct FunctionCallUseCase {
    store: Arc<dyn SessionStore>,
    gate: Arc<SessionGate>,
    handler: Arc<dyn FunctionHandler>,
    fallback: ExtractionFallback,
    sink: Arc<dyn LedgerSink>,
    resolver: ParameterResolver,
    validator: Validator,
    today: Today,
}

/// Everything the pipeline learned before building the response.
struct Attempt {
    resolution: Resolution,
    outcome: CallOutcome,
    response: FunctionCallResponse,
    extraction: Option<ExtractionReport>,
}

impl FunctionCallUseCase {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gate: Arc<SessionGate>,
        handler: Arc<dyn FunctionHandler>,
        fallback: ExtractionFallback,
        sink: Arc<dyn LedgerSink>,
        today: Today,
    ) -> Self {
        Self {
            store,
            gate,
            handler,
            fallback,
            sink,
            resolver: ParameterResolver::new(),
            validator: Validator::new(),
            today,
        }
    }

    /// Runs one function call. Never fails: internal errors become
    /// [`FunctionCallResponse::SystemFailed`].
    pub async fn execute(
        &self,
        request: FunctionCallRequest,
        cancel: CancellationToken,
    ) -> FunctionCallResponse {
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty());
        tracing::debug!(
            "[FunctionCall] {} session={:?}",
            request.function_name,
            session_id
        );

        let _guard = match &session_id {
            Some(id) => Some(self.gate.acquire(id).await),
            None => None,
        };

        let attempt = match self
            .attempt(&request, session_id.as_deref(), &cancel)
            .await
        {
            Ok(attempt) => attempt,
            Err(error) => {
                // Nothing was resolved, so the raw parameters are all there is.
                let (outcome, response) = system_failure(&request.function_name, &error);
                let record = CallRecord::new(
                    request.function_name.clone(),
                    request.parameters.clone(),
                    Vec::new(),
                    outcome,
                );
                self.sink.publish(session_id.as_deref(), &record);
                if let Some(id) = &session_id {
                    // Best effort: the store itself may be what failed.
                    if let Err(e) = self.append_record(id, record, None, Vec::new()).await {
                        tracing::error!("[FunctionCall] could not ledger system failure: {}", e);
                    }
                }
                return response;
            }
        };

        let Attempt {
            resolution,
            outcome,
            response,
            extraction,
        } = attempt;
        let record = CallRecord::new(
            request.function_name.clone(),
            resolution.params.clone(),
            resolution.auto_filled_fields(),
            outcome,
        )
        .with_extraction(extraction);
        self.sink.publish(session_id.as_deref(), &record);

        if let Some(id) = &session_id {
            if let Err(error) = self
                .append_record(id, record, resolution.schema, resolution.overrides)
                .await
            {
                tracing::error!(
                    "[FunctionCall] session={} could not append ledger record: {}",
                    id,
                    error
                );
                // The handler already acted; report what it did.
                if !response.is_success() {
                    return FunctionCallResponse::SystemFailed(SystemFailureBody::default());
                }
            }
        }

        response
    }

    /// Fails only when the session cannot be read at all. Later internal
    /// errors become a `SystemFailed` outcome that keeps the resolution.
    async fn attempt(
        &self,
        request: &FunctionCallRequest,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        let state = match session_id {
            Some(id) => Some(self.store.get(id).await?),
            None => None,
        };

        let mut resolution =
            self.resolver
                .resolve(state.as_ref(), &request.function_name, &request.parameters);
        let mut validation = self.validator.validate(&request.function_name, &resolution.params);
        let mut extraction = None;

        let gaps = match &validation {
            Validation::Invalid(error)
                if !error.missing_fields.is_empty() || !error.alternatives.is_empty() =>
            {
                Some((error.missing_fields.clone(), error.alternatives.clone()))
            }
            _ => None,
        };
        if let (Some((missing_fields, alternatives)), Some(id), Some(schema), Some(state)) =
            (gaps, session_id, resolution.schema, state.as_ref())
        {
            let transcript = transcript_for(request, state);
            let report = self
                .fallback
                .run(
                    FallbackInput {
                        session_id: id,
                        schema,
                        missing_fields: &missing_fields,
                        alternatives: &alternatives,
                        transcript: &transcript,
                        today: (self.today)(),
                    },
                    cancel,
                )
                .await;

            if let Some(mut report) = report {
                if !report.filled.is_empty() {
                    let refreshed = match self.store.get(id).await {
                        Ok(refreshed) => refreshed,
                        Err(error) => {
                            let (outcome, response) =
                                system_failure(&request.function_name, &error);
                            return Ok(Attempt {
                                resolution,
                                outcome,
                                response,
                                extraction: Some(report),
                            });
                        }
                    };
                    resolution = self.resolver.resolve(
                        Some(&refreshed),
                        &request.function_name,
                        &request.parameters,
                    );
                    validation =
                        self.validator.validate(&request.function_name, &resolution.params);
                    report.revalidated = validation.is_valid();
                }
                extraction = Some(report);
            }
        }

        let (outcome, response) = match validation {
            Validation::Invalid(error) => validation_failure(*error, extraction.clone()),
            Validation::Valid(params) => match self
                .dispatch(request, session_id, &resolution, params, &extraction, cancel)
                .await
            {
                Ok(handled) => handled,
                Err(error) => system_failure(&request.function_name, &error),
            },
        };

        Ok(Attempt {
            resolution,
            outcome,
            response,
            extraction,
        })
    }

    async fn dispatch(
        &self,
        request: &FunctionCallRequest,
        session_id: Option<&str>,
        resolution: &Resolution,
        params: Params,
        extraction: &Option<ExtractionReport>,
        cancel: &CancellationToken,
    ) -> Result<(CallOutcome, FunctionCallResponse)> {
        let (call, parameters) = match resolution.schema {
            Some(schema) => {
                let call = FunctionCall::from_validated(schema, &params)?;
                let parameters = call.to_params()?;
                (Some(call), parameters)
            }
            None => (None, params),
        };
        let invocation = HandlerInvocation {
            function_name: request.function_name.clone(),
            session_id: session_id.map(str::to_string),
            parameters,
            call,
        };

        let handled = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(FrontdeskError::system("request cancelled before the handler finished"));
            }
            handled = self.handler.handle(&invocation) => handled,
        };

        match handled {
            Ok(result) => {
                tracing::info!(
                    "[FunctionCall] {} succeeded (auto-filled {:?})",
                    request.function_name,
                    resolution.auto_filled.keys().collect::<Vec<_>>()
                );
                Ok((
                    CallOutcome::Success {
                        result: result.clone(),
                    },
                    FunctionCallResponse::Success {
                        result,
                        auto_filled: resolution.auto_filled_fields(),
                        extraction: extraction.clone(),
                    },
                ))
            }
            Err(error) => {
                tracing::warn!(
                    "[FunctionCall] {} handler failed: {}",
                    request.function_name,
                    error
                );
                let message = error.to_string();
                Ok((
                    CallOutcome::HandlerFailed {
                        message: message.clone(),
                    },
                    FunctionCallResponse::HandlerFailed(HandlerFailureBody::new(
                        request.function_name.clone(),
                        message,
                    )),
                ))
            }
        }
    }

    async fn append_record(
        &self,
        session_id: &str,
        record: CallRecord,
        schema: Option<&'static frontdesk_core::schema::FunctionSchema>,
        overrides: Vec<frontdesk_core::session::OverrideEvent>,
    ) -> Result<ConversationState> {
        self.store
            .update(
                session_id,
                Box::new(move |state: &mut ConversationState| {
                    state.record_overrides(overrides);
                    ledger::record(state, record, schema);
                }),
            )
            .await
    }
}

fn validation_failure(
    error: ValidationError,
    extraction: Option<ExtractionReport>,
) -> (CallOutcome, FunctionCallResponse) {
    let outcome = CallOutcome::ValidationFailed {
        message: error.message.clone(),
        missing_fields: error.missing_fields.clone(),
        invalid_fields: error.invalid_field_names(),
    };
    (
        outcome,
        FunctionCallResponse::ValidationFailed(Box::new(ValidationFailureBody::new(
            error, extraction,
        ))),
    )
}

fn system_failure(
    function_name: &str,
    error: &FrontdeskError,
) -> (CallOutcome, FunctionCallResponse) {
    tracing::error!(
        "[FunctionCall] {} failed with a system error: {}",
        function_name,
        error
    );
    (
        CallOutcome::SystemFailed {
            message: error.to_string(),
        },
        FunctionCallResponse::SystemFailed(SystemFailureBody::default()),
    )
}

/// The caller's transcript when supplied, else the session's messages.
fn transcript_for(request: &FunctionCallRequest, state: &ConversationState) -> Vec<TranscriptLine> {
    match &request.conversation_history {
        Some(history) if !history.is_empty() => history.clone(),
        _ => state.messages().iter().map(TranscriptLine::from).collect(),
    }
}

#[cfg(test)]
#[path = "function_call_usecase_test.rs"]
mod tests;

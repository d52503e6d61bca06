//! The generation pipeline.
//!
//! Orders the stages of one attempt: validate the request, pass the credit
//! gate, invoke the flow under a timeout, then settle a failure according to
//! the [`RefundPolicy`].

use crate::error::PipelineError;
use crate::flow::GenerationFlow;
use crate::invoker::Invoker;
use kelasi_ai::LlmBackend;
use kelasi_core::UserId;
use kelasi_credits::{CreditLedger, Deduction, GateError};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// What happens to the credits of an attempt that was charged but failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundPolicy {
    /// Charged credits are kept.
    #[default]
    Never,
    /// Charged credits are granted back when generation fails.
    OnGenerationFailure,
}

/// Tunables for every attempt.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Credits charged per attempt.
    pub cost_per_generation: i64,
    /// How long to wait for the model.
    pub timeout: Duration,
    /// Settlement of charged failures.
    pub refund_policy: RefundPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cost_per_generation: 1,
            timeout: Duration::from_secs(120),
            refund_policy: RefundPolicy::Never,
        }
    }
}

/// The collaborators every pipeline shares.
#[derive(Clone)]
pub struct GenerationContext {
    pub ledger: Arc<dyn CreditLedger>,
    pub backend: Arc<dyn LlmBackend>,
    pub settings: Settings,
}

impl GenerationContext {
    /// Bundles a ledger, a backend and settings.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        backend: Arc<dyn LlmBackend>,
        settings: Settings,
    ) -> Self {
        Self {
            ledger,
            backend,
            settings,
        }
    }

    /// An invoker over this context's backend.
    #[must_use]
    pub fn invoker(&self) -> Invoker {
        Invoker::new(Arc::clone(&self.backend))
    }

    /// Lists the backend's models, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `GenerationFailed` if the backend fails or does not answer in time.
    pub async fn list_models(&self) -> Result<Vec<String>, Report<PipelineError>> {
        tokio::time::timeout(self.settings.timeout, self.invoker().list_models())
            .await
            .unwrap_or_else(|_| Err(timed_out(self.settings.timeout).into()))
    }
}

fn timed_out(timeout: Duration) -> PipelineError {
    PipelineError::GenerationFailed {
        reason: format!("no response within {}s", timeout.as_secs()),
    }
}

fn gate_rejection(report: Report<GateError>) -> Report<PipelineError> {
    let error = match report.current_context() {
        GateError::Unauthenticated => PipelineError::Unauthenticated,
        GateError::InsufficientCredits { balance, cost, .. } => PipelineError::InsufficientCredits {
            balance: *balance,
            cost: *cost,
        },
        GateError::Ledger(e) => PipelineError::LedgerUnavailable {
            reason: e.to_string(),
        },
    };
    report.context(error)
}

/// One flow wired to its collaborators.
pub struct Pipeline<F> {
    context: GenerationContext,
    flow: F,
}

impl<F: GenerationFlow> Pipeline<F> {
    /// Creates a pipeline for a flow.
    #[must_use]
    pub fn new(context: GenerationContext, flow: F) -> Self {
        Self { context, flow }
    }

    /// The flow this pipeline runs.
    #[must_use]
    pub fn flow(&self) -> &F {
        &self.flow
    }

    /// Runs one generation attempt.
    ///
    /// Invalid requests are rejected before the ledger is touched. Refused
    /// attempts never reach the backend. A charged attempt makes exactly one
    /// backend call.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`]; see the variant docs for which stages ran.
    #[instrument(skip_all, fields(flow = self.flow.name(), user_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        identity: Option<UserId>,
        input: F::Input,
    ) -> Result<F::Output, Report<PipelineError>> {
        if let Some(user_id) = identity {
            tracing::Span::current().record("user_id", tracing::field::display(user_id));
        }

        if let Err(e) = self.flow.validate(&input) {
            tracing::info!(error = %e, "request rejected");
            return Err(e.into());
        }

        let settings = &self.context.settings;
        let deduction = self
            .context
            .ledger
            .authorize_and_deduct(identity, settings.cost_per_generation)
            .await
            .map_err(gate_rejection)?;

        let invoker = self.context.invoker();
        let outcome = match tokio::time::timeout(
            settings.timeout,
            invoker.generate(&self.flow, &input),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = settings.timeout.as_secs(),
                    "generation timed out"
                );
                Err(timed_out(settings.timeout).into())
            }
        };

        if let Err(report) = &outcome {
            self.settle_failure(&deduction, report.current_context())
                .await;
        }
        outcome
    }

    async fn settle_failure(&self, deduction: &Deduction, error: &PipelineError) {
        match self.context.settings.refund_policy {
            RefundPolicy::Never => {
                tracing::warn!(
                    error = %error,
                    charged = deduction.charged,
                    "generation failed after charge"
                );
            }
            RefundPolicy::OnGenerationFailure => {
                match self
                    .context
                    .ledger
                    .grant(deduction.user_id, deduction.charged)
                    .await
                {
                    Ok(balance) => tracing::info!(
                        error = %error,
                        refunded = deduction.charged,
                        balance,
                        "generation failed, credits refunded"
                    ),
                    Err(e) => tracing::error!(
                        error = %error,
                        refund_error = %e,
                        "generation failed and refund could not be applied"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{LessonFlow, QuizFlow};
    use async_trait::async_trait;
    use kelasi_ai::{LlmError, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
    use kelasi_content::{GenerationRequest, InvalidInput, LessonRequest, QuestionType};
    use kelasi_credits::InMemoryLedger;
    use serde_json::{Value as JsonValue, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LESSON: &str = "Les volcans se forment lorsque le magma remonte à la surface de la Terre.";

    enum Script {
        Reply(JsonValue),
        Fail(LlmError),
        Hang,
    }

    struct ScriptedBackend {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Reply(value) => Ok(LlmResponse {
                    content: value.to_string(),
                    structured_output: Some(value.clone()),
                    usage: TokenUsage::default(),
                    model: "scripted".to_string(),
                }),
                Script::Fail(e) => Err(e.clone()),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(LlmError::Timeout)
                }
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec![])
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::Gemini
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn multiple_choice(options: &[&str]) -> JsonValue {
        json!({
            "questions": [{
                "question": "Qu'est-ce qui remonte dans un volcan ?",
                "options": options,
                "answer": options[0]
            }]
        })
    }

    struct Harness {
        ledger: InMemoryLedger,
        backend: Arc<ScriptedBackend>,
        user: UserId,
        pipeline: Pipeline<QuizFlow>,
    }

    fn harness(script: Script, credits: i64, settings: Settings) -> Harness {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, credits)]);
        let backend = ScriptedBackend::new(script);
        let context = GenerationContext::new(
            Arc::new(ledger.clone()),
            backend.clone(),
            settings,
        );
        Harness {
            ledger,
            backend,
            user,
            pipeline: Pipeline::new(context, QuizFlow::default()),
        }
    }

    fn mc_request() -> GenerationRequest {
        GenerationRequest::from_text(LESSON, QuestionType::MultipleChoice, 1)
    }

    #[tokio::test]
    async fn successful_attempt_charges_once() {
        let h = harness(
            Script::Reply(multiple_choice(&["Le magma", "L'eau", "Le sable", "Le vent"])),
            3,
            Settings::default(),
        );

        let quiz = h
            .pipeline
            .run(Some(h.user), mc_request())
            .await
            .expect("generation succeeds");

        assert_eq!(quiz.questions[0].correct_answer, "Le magma");
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 2);
    }

    #[tokio::test]
    async fn missing_source_touches_nothing() {
        let h = harness(Script::Reply(json!({})), 3, Settings::default());
        let request = GenerationRequest {
            text: None,
            document: None,
            question_type: QuestionType::MultipleChoice,
            count: 5,
        };

        let err = h
            .pipeline
            .run(Some(h.user), request)
            .await
            .expect_err("no source");

        assert_eq!(
            err.current_context(),
            &PipelineError::InvalidInput(InvalidInput::MissingSource)
        );
        assert_eq!(h.backend.calls(), 0);
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 3);
    }

    #[tokio::test]
    async fn out_of_range_counts_touch_nothing() {
        let h = harness(Script::Reply(json!({})), 3, Settings::default());

        for count in [0, 11] {
            let request = GenerationRequest::from_text(LESSON, QuestionType::TrueFalse, count);
            let err = h
                .pipeline
                .run(Some(h.user), request)
                .await
                .expect_err("out of range");
            assert!(matches!(
                err.current_context(),
                PipelineError::InvalidInput(InvalidInput::OutOfRange { .. })
            ));
        }

        assert_eq!(h.backend.calls(), 0);
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 3);
    }

    #[tokio::test]
    async fn refused_attempts_never_generate() {
        let h = harness(Script::Reply(json!({})), 0, Settings::default());

        let anonymous = h
            .pipeline
            .run(None, mc_request())
            .await
            .expect_err("anonymous");
        assert_eq!(anonymous.current_context(), &PipelineError::Unauthenticated);

        let unknown = h
            .pipeline
            .run(Some(UserId::new()), mc_request())
            .await
            .expect_err("unknown account");
        assert_eq!(unknown.current_context(), &PipelineError::Unauthenticated);

        let broke = h
            .pipeline
            .run(Some(h.user), mc_request())
            .await
            .expect_err("no credits");
        assert_eq!(
            broke.current_context(),
            &PipelineError::InsufficientCredits {
                balance: 0,
                cost: 1
            }
        );

        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn three_options_for_multiple_choice_is_malformed() {
        let h = harness(
            Script::Reply(multiple_choice(&["Le magma", "L'eau", "Le sable"])),
            2,
            Settings::default(),
        );

        let err = h
            .pipeline
            .run(Some(h.user), mc_request())
            .await
            .expect_err("three options");

        assert!(matches!(
            err.current_context(),
            PipelineError::MalformedOutput { .. }
        ));
        // The default policy keeps the charge.
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 1);
    }

    #[tokio::test]
    async fn refund_policy_restores_failed_charge() {
        let settings = Settings {
            refund_policy: RefundPolicy::OnGenerationFailure,
            ..Settings::default()
        };
        let h = harness(
            Script::Fail(LlmError::RequestFailed {
                reason: "status 500".to_string(),
            }),
            2,
            settings,
        );

        let err = h
            .pipeline
            .run(Some(h.user), mc_request())
            .await
            .expect_err("backend fails");

        assert!(matches!(
            err.current_context(),
            PipelineError::GenerationFailed { .. }
        ));
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 2);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let settings = Settings {
            timeout: Duration::from_millis(50),
            ..Settings::default()
        };
        let h = harness(Script::Hang, 1, settings);

        let err = h
            .pipeline
            .run(Some(h.user), mc_request())
            .await
            .expect_err("times out");

        assert!(matches!(
            err.current_context(),
            PipelineError::GenerationFailed { .. }
        ));
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_credit_two_concurrent_attempts() {
        let h = harness(
            Script::Reply(multiple_choice(&["Le magma", "L'eau", "Le sable", "Le vent"])),
            1,
            Settings::default(),
        );

        let (first, second) = tokio::join!(
            h.pipeline.run(Some(h.user), mc_request()),
            h.pipeline.run(Some(h.user), mc_request()),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(
            o.as_ref().map_err(|e| e.current_context()),
            Err(PipelineError::InsufficientCredits { .. })
        )));
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.ledger.balance(h.user).await.expect("balance"), 0);
    }

    #[tokio::test]
    async fn lesson_pipeline_shares_context() {
        let user = UserId::new();
        let ledger = InMemoryLedger::with_accounts([(user, 1)]);
        let backend = ScriptedBackend::new(Script::Reply(json!({
            "title": "Les volcans",
            "objectives": ["Expliquer la formation d'un volcan"],
            "sections": [{"heading": "Introduction", "body": "Qu'est-ce qu'un volcan ?"}]
        })));
        let context = GenerationContext::new(Arc::new(ledger.clone()), backend, Settings::default());
        let pipeline = Pipeline::new(context, LessonFlow::default());

        let lesson = pipeline
            .run(
                Some(user),
                LessonRequest {
                    topic: "Les volcans".to_string(),
                    grade_level: "6e".to_string(),
                    subject: None,
                    duration_minutes: Some(45),
                },
            )
            .await
            .expect("generation succeeds");

        assert_eq!(lesson.title, "Les volcans");
        assert_eq!(ledger.balance(user).await.expect("balance"), 0);
    }
}

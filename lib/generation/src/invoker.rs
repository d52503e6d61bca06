//! The generation invoker.

use crate::error::PipelineError;
use crate::flow::GenerationFlow;
use kelasi_ai::LlmBackend;
use rootcause::prelude::Report;
use std::sync::Arc;

/// Runs flows against a generation backend.
///
/// Each call to [`Invoker::generate`] makes exactly one backend request and
/// never retries. Timeouts are the caller's concern.
#[derive(Clone)]
pub struct Invoker {
    backend: Arc<dyn LlmBackend>,
}

impl Invoker {
    /// Creates an invoker over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Generates content for one request.
    ///
    /// # Errors
    ///
    /// - `MissingInput` if the request has nothing to generate from; the
    ///   backend is not called
    /// - `GenerationFailed` if the backend call fails, with its error as cause
    /// - `MalformedOutput` if the answer is not JSON of the expected shape
    pub async fn generate<F: GenerationFlow>(
        &self,
        flow: &F,
        input: &F::Input,
    ) -> Result<F::Output, Report<PipelineError>> {
        let call = flow.build_call(input)?;

        let result = match call.execute(self.backend.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                let reason = e.to_string();
                return Err(Report::new(e).context(PipelineError::GenerationFailed { reason }));
            }
        };

        let Some(value) = result.structured_output else {
            return Err(PipelineError::MalformedOutput {
                reason: "response is not JSON".to_string(),
            }
            .into());
        };

        let output: F::Output =
            serde_json::from_value(value).map_err(|e| PipelineError::MalformedOutput {
                reason: e.to_string(),
            })?;
        flow.check_output(input, &output)?;

        tracing::info!(
            flow = flow.name(),
            invocation_id = %result.id,
            latency_ms = result.latency_ms,
            "generation succeeded"
        );
        Ok(output)
    }

    /// Lists the models the backend can serve.
    ///
    /// # Errors
    ///
    /// Returns `GenerationFailed` if the backend cannot be reached.
    pub async fn list_models(&self) -> Result<Vec<String>, Report<PipelineError>> {
        match self.backend.list_models().await {
            Ok(models) => Ok(models),
            Err(e) => {
                let reason = e.to_string();
                Err(Report::new(e).context(PipelineError::GenerationFailed { reason }))
            }
        }
    }
}

//! The iterative tool-call loop for one user turn.
//!
//! Each iteration calls the model, classifies the reply and either returns
//! it as the final answer or runs the requested tools and feeds their
//! results back as the next input. The loop is bounded by
//! [`MAX_ITERATIONS`]; a model that is still calling tools at that point gets
//! a summary of everything that ran instead of an answer.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tabpilot_providers::{CompletionRequest, LLMProvider, Message, MessageRole};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::classifier::{classify, Classification};
use crate::context::{ContextBuilder, TurnInput};
use crate::error::TurnError;
use crate::feedback::{capped_reply, format_tool_results};
use crate::tools::{ToolExecutor, ToolResult};
use crate::ToolCall;

pub const MAX_ITERATIONS: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress callbacks for whoever is rendering the turn.
pub trait TurnObserver: Send + Sync {
    fn on_model_call(&self, _iteration: usize) {}
    fn on_tool_start(&self, _call: &ToolCall) {}
    fn on_tool_result(&self, _result: &ToolResult) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl TurnObserver for NullObserver {}

/// Per-turn bookkeeping; dropped once the turn has its reply.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub iteration_count: usize,
    pub accumulated_results: Vec<ToolResult>,
    pub current_input: String,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    /// True when the reply is the iteration-limit summary
    pub capped: bool,
    pub iterations: usize,
    pub tool_results: Vec<ToolResult>,
}

pub struct ToolLoop {
    provider: Arc<dyn LLMProvider>,
    executor: ToolExecutor,
    context: RwLock<ContextBuilder>,
    max_iterations: usize,
    request_timeout: Duration,
    observer: Arc<dyn TurnObserver>,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        executor: ToolExecutor,
        context: ContextBuilder,
    ) -> Self {
        Self {
            provider,
            executor,
            context: RwLock::new(context),
            max_iterations: MAX_ITERATIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            observer: Arc::new(NullObserver),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.clamp(1, MAX_ITERATIONS);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn system_instructions(&self) -> String {
        self.context
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .system_instructions()
            .to_string()
    }

    /// Takes effect from the next model call.
    pub fn set_system_instructions(&self, instructions: impl Into<String>) {
        self.context
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .set_system_instructions(instructions);
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub async fn run(
        &self,
        prior: &[Message],
        input: TurnInput,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let mut state = LoopState {
            current_input: input.text.clone(),
            ..LoopState::default()
        };
        let mut transcript = vec![Message::with_images(
            MessageRole::User,
            input.text,
            input.images,
        )];

        while state.iteration_count < self.max_iterations {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            debug!(
                "Tool iteration {}/{}",
                state.iteration_count + 1,
                self.max_iterations
            );
            self.observer.on_model_call(state.iteration_count + 1);

            let request = self
                .context
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .build(prior, &transcript);
            let reply = self.call_model(request, cancel).await?;

            let calls = match classify(&reply) {
                Classification::FinalAnswer(answer) => {
                    return Ok(TurnOutcome {
                        reply: answer,
                        capped: false,
                        iterations: state.iteration_count,
                        tool_results: state.accumulated_results,
                    });
                }
                Classification::ToolCalls(calls) => calls,
            };

            debug!("Executing {} tool call(s)", calls.len());
            let mut batch = Vec::with_capacity(calls.len());
            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(TurnError::Cancelled);
                }
                self.observer.on_tool_start(call);
                let result = self.executor.execute(call).await;
                self.observer.on_tool_result(&result);
                batch.push(result);
            }
            state.accumulated_results.extend(batch.iter().cloned());

            // Images go with the first request only
            if let Some(first) = transcript.first_mut() {
                first.images.clear();
            }

            let feedback = format_tool_results(&batch);
            transcript.push(Message::new(MessageRole::Assistant, reply));
            transcript.push(Message::new(MessageRole::User, feedback.clone()));
            state.current_input = feedback;
            state.iteration_count += 1;
        }

        info!(
            "Reached the iteration limit after {} tool operations",
            state.accumulated_results.len()
        );
        Ok(TurnOutcome {
            reply: capped_reply(&state.accumulated_results),
            capped: true,
            iterations: state.iteration_count,
            tool_results: state.accumulated_results,
        })
    }

    async fn call_model(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let call = tokio::time::timeout(self.request_timeout, self.provider.complete(request));

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Model call cancelled");
                Err(TurnError::Cancelled)
            }
            outcome = call => match outcome {
                Err(_) => {
                    error!("Model call timed out after {:?}", self.request_timeout);
                    Err(TurnError::Timeout(self.request_timeout.as_secs()))
                }
                Ok(Err(e)) => {
                    error!("Model call failed: {}", e);
                    Err(TurnError::Provider(e.to_string()))
                }
                Ok(Ok(response)) => Ok(response.content),
            },
        }
    }
}

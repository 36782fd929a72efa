//! Patches rejected code using the validator's violation list.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::AgentContext;
use crate::error::ForgeError;
use crate::io::completion::{CompletionClient, CompletionRequest, complete_text};
use crate::io::prompt::{PromptKind, PromptVars};

/// Inputs for one correction.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionRequest<'a> {
    pub user_prompt: &'a str,
    pub previous_code: &'a str,
    /// Violations, one per line.
    pub error_log: &'a str,
    /// Attempt whose verdict is being corrected, for error context.
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct Corrector {
    ctx: AgentContext,
    temperature: f64,
}

impl Corrector {
    pub fn new(ctx: AgentContext, temperature: f64) -> Self {
        Self { ctx, temperature }
    }

    #[instrument(skip_all, fields(attempt = request.attempt))]
    pub fn correct<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        request: CorrectionRequest<'_>,
    ) -> Result<String, ForgeError> {
        self.try_correct(client, request)
            .map_err(|source| ForgeError::Correction {
                attempt: request.attempt,
                source,
            })
    }

    fn try_correct<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        request: CorrectionRequest<'_>,
    ) -> Result<String> {
        let system = self.ctx.prompts.render(PromptKind::System, &PromptVars::new())?;
        let task = self.ctx.prompts.render(
            PromptKind::Correction,
            &PromptVars::new()
                .set("design_rules", self.ctx.design_rules())
                .set("user_prompt", request.user_prompt)
                .set("previous_code", request.previous_code)
                .set("error_logs", request.error_log),
        )?;
        let code = complete_text(client, &CompletionRequest::text(system, task, self.temperature))?;
        debug!(bytes = code.len(), "corrected component");
        Ok(code)
    }
}

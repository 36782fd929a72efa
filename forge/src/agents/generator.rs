//! Initial code generation.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::AgentContext;
use crate::error::ForgeError;
use crate::io::completion::{CompletionClient, CompletionRequest, complete_text};
use crate::io::prompt::{PromptKind, PromptVars};

/// Produces the first code artifact for a user prompt.
#[derive(Debug, Clone)]
pub struct Generator {
    ctx: AgentContext,
    temperature: f64,
}

impl Generator {
    pub fn new(ctx: AgentContext, temperature: f64) -> Self {
        Self { ctx, temperature }
    }

    /// Generate a component for `user_prompt`. The completion is not retried.
    #[instrument(skip_all, fields(prompt_bytes = user_prompt.len()))]
    pub fn generate<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        user_prompt: &str,
    ) -> Result<String, ForgeError> {
        self.try_generate(client, user_prompt)
            .map_err(|source| ForgeError::Generation { source })
    }

    fn try_generate<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        user_prompt: &str,
    ) -> Result<String> {
        let system = self.ctx.prompts.render(PromptKind::System, &PromptVars::new())?;
        let task = self.ctx.prompts.render(
            PromptKind::Generator,
            &PromptVars::new()
                .set("design_rules", self.ctx.design_rules())
                .set("user_prompt", user_prompt),
        )?;
        let code = complete_text(client, &CompletionRequest::text(system, task, self.temperature))?;
        debug!(bytes = code.len(), "generated component");
        Ok(code)
    }
}

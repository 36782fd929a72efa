//! Two-stage validation: deterministic rules, then a model verdict.
//!
//! The semantic stage only runs when the rule stage finds nothing. Its verdict
//! is returned as the model produced it, after a schema check and the verdict
//! invariant check; a failed or malformed answer is an error, never a default
//! verdict.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::agents::AgentContext;
use crate::core::checks::rule_violations;
use crate::core::types::{RULE_BASED_REASON, Verdict};
use crate::error::ForgeError;
use crate::io::completion::{CompletionClient, CompletionRequest, complete_structured};
use crate::io::prompt::{PromptKind, PromptVars};

pub const VALIDATOR_SYSTEM_PROMPT: &str = "You are a strict Angular validation agent.";

const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

#[derive(Debug, Clone)]
pub struct Validator {
    ctx: AgentContext,
    temperature: f64,
}

impl Validator {
    pub fn new(ctx: AgentContext, temperature: f64) -> Self {
        Self { ctx, temperature }
    }

    /// Deterministic stage alone. `Some` holds a rejection.
    pub fn check_rules(&self, code: &str) -> Option<Verdict> {
        let violations = rule_violations(code, self.ctx.policy.allowed_colors());
        if violations.is_empty() {
            return None;
        }
        info!(count = violations.len(), "rule-based validation failed");
        Some(Verdict::rejected(RULE_BASED_REASON, violations))
    }

    /// Verdict from the deterministic stage only; never calls the model.
    pub fn rules_only(&self, code: &str) -> Verdict {
        self.check_rules(code).unwrap_or_else(Verdict::approved)
    }

    /// Full validation of `code` for the given 1-based attempt.
    #[instrument(skip_all, fields(attempt = attempt))]
    pub fn validate<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        code: &str,
        attempt: u32,
    ) -> Result<Verdict, ForgeError> {
        if let Some(rejection) = self.check_rules(code) {
            return Ok(rejection);
        }
        self.semantic_verdict(client, code)
            .map_err(|source| ForgeError::Validation { attempt, source })
    }

    fn semantic_verdict<C: CompletionClient + ?Sized>(
        &self,
        client: &C,
        code: &str,
    ) -> Result<Verdict> {
        let task = self.ctx.prompts.render(
            PromptKind::Validation,
            &PromptVars::new()
                .set("design_rules", self.ctx.design_rules())
                .set("generated_code", code),
        )?;
        let request =
            CompletionRequest::json(VALIDATOR_SYSTEM_PROMPT, task, self.temperature, VERDICT_SCHEMA);
        let verdict: Verdict = complete_structured(client, &request)?;
        if let Some(problem) = verdict.invariant_violation() {
            return Err(anyhow!("malformed verdict: {problem}"));
        }
        debug!(approved = verdict.approved, "semantic verdict received");
        Ok(verdict)
    }
}

//! The generation loop.
//!
//! A session runs `GENERATE -> VALIDATE -> (CORRECT -> VALIDATE)* -> DONE`
//! strictly in sequence, blocking on every completion call. Sessions share
//! nothing mutable: each [`SessionRunner::run`] starts from an empty
//! [`Session`], and refinement re-enters at `GENERATE` with a composite prompt
//! rather than reusing any earlier history.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::agents::corrector::CorrectionRequest;
use crate::agents::{AgentContext, Corrector, Generator, Validator};
use crate::core::transition::{self, MAX_RETRIES_LIMIT};
use crate::core::types::{AttemptRecord, LoopState, Session, SessionOutcome};
use crate::error::ForgeError;
use crate::io::completion::CompletionClient;
use crate::io::config::SamplingConfig;
use crate::io::policy::DesignPolicy;
use crate::io::prompt::{PromptEngine, PromptKind, PromptVars};

/// Request to revise an existing component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineRequest {
    pub original_prompt: String,
    pub existing_code: String,
    pub instructions: String,
}

impl RefineRequest {
    /// Render the composite prompt that seeds the refinement session.
    pub fn compose(&self, prompts: &PromptEngine) -> Result<String> {
        prompts.render(
            PromptKind::Refine,
            &PromptVars::new()
                .set("original_prompt", self.original_prompt.as_str())
                .set("existing_code", self.existing_code.as_str())
                .set("instructions", self.instructions.as_str()),
        )
    }
}

/// Runs sessions against one completion client with explicitly built agents.
#[derive(Debug)]
pub struct SessionRunner<C> {
    client: C,
    prompts: Arc<PromptEngine>,
    generator: Generator,
    corrector: Corrector,
    validator: Validator,
}

impl<C: CompletionClient> SessionRunner<C> {
    pub fn new(client: C, policy: Arc<DesignPolicy>, sampling: SamplingConfig) -> Result<Self> {
        let prompts = Arc::new(PromptEngine::new()?);
        let ctx = AgentContext::new(policy, Arc::clone(&prompts));
        Ok(Self {
            client,
            generator: Generator::new(ctx.clone(), sampling.generation_temperature),
            corrector: Corrector::new(ctx.clone(), sampling.generation_temperature),
            validator: Validator::new(ctx, sampling.validation_temperature),
            prompts,
        })
    }

    /// Run one session for `user_prompt` with up to `max_retries` corrections.
    ///
    /// Running out of retries is a normal outcome with `approved == false`;
    /// only stage failures are errors.
    pub fn run(&self, user_prompt: &str, max_retries: u32) -> Result<SessionOutcome, ForgeError> {
        self.run_with(user_prompt, max_retries, |_| {})
    }

    /// Like [`SessionRunner::run`], calling `on_attempt` after every validation.
    #[instrument(skip_all, fields(max_retries = max_retries))]
    pub fn run_with<F: FnMut(&AttemptRecord)>(
        &self,
        user_prompt: &str,
        max_retries: u32,
        mut on_attempt: F,
    ) -> Result<SessionOutcome, ForgeError> {
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(ForgeError::RetryBudget {
                requested: max_retries,
                limit: MAX_RETRIES_LIMIT,
            });
        }

        let mut session = Session::new(user_prompt);
        let mut state = LoopState::Generate;
        loop {
            debug!(state = state.as_str(), retry_count = session.retry_count, "loop step");
            state = match state {
                LoopState::Generate => {
                    session.current_code =
                        self.generator.generate(&self.client, &session.user_prompt)?;
                    transition::advance(state)
                }
                LoopState::Validate => {
                    let attempt = session.retry_count + 1;
                    let verdict =
                        self.validator
                            .validate(&self.client, &session.current_code, attempt)?;
                    if !verdict.approved {
                        info!(
                            attempt,
                            reason = %verdict.reason,
                            violations = verdict.violations.len(),
                            "attempt rejected"
                        );
                    }
                    on_attempt(session.record_verdict(verdict));
                    transition::after_validate(session.approved, session.retry_count, max_retries)
                }
                LoopState::Correct => {
                    let error_log = session.error_points.join("\n");
                    let code = self.corrector.correct(
                        &self.client,
                        CorrectionRequest {
                            user_prompt: &session.user_prompt,
                            previous_code: &session.current_code,
                            error_log: &error_log,
                            attempt: session.retry_count + 1,
                        },
                    )?;
                    session.apply_correction(code);
                    transition::advance(state)
                }
                LoopState::Done => break,
            };
        }

        let outcome = session.finish();
        info!(
            approved = outcome.approved,
            attempts = outcome.attempts.len(),
            retry_count = outcome.retry_count,
            "session finished"
        );
        Ok(outcome)
    }

    /// Revise existing code in a fresh session seeded by a composite prompt.
    pub fn refine(
        &self,
        request: &RefineRequest,
        max_retries: u32,
    ) -> Result<SessionOutcome, ForgeError> {
        self.refine_with(request, max_retries, |_| {})
    }

    pub fn refine_with<F: FnMut(&AttemptRecord)>(
        &self,
        request: &RefineRequest,
        max_retries: u32,
        on_attempt: F,
    ) -> Result<SessionOutcome, ForgeError> {
        let prompt = request
            .compose(&self.prompts)
            .map_err(|source| ForgeError::Generation { source })?;
        self.run_with(&prompt, max_retries, on_attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checks::MISSING_IMPORT;
    use crate::core::types::{RULE_BASED_REASON, Verdict};
    use crate::test_support::{
        ScriptedClient, component_missing_import, shipped_policy, valid_component,
    };

    fn runner(client: ScriptedClient) -> SessionRunner<ScriptedClient> {
        SessionRunner::new(client, Arc::new(shipped_policy()), SamplingConfig::default())
            .expect("runner")
    }

    fn layout_rejection() -> Verdict {
        Verdict::rejected(
            "Layout intent not met.",
            vec!["Card is not centered.".to_string(), "Button label is vague.".to_string()],
        )
    }

    #[test]
    fn approved_on_first_attempt() {
        let runner = runner(
            ScriptedClient::new()
                .text(valid_component())
                .verdict(&Verdict::approved()),
        );
        let outcome = runner.run("login card", 2).expect("run");

        assert!(outcome.approved);
        assert_eq!(outcome.retry_count, 0);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.final_code, valid_component());
        assert_eq!(outcome.user_prompt, "login card");
        assert_eq!(runner.client.call_count(), 2);
    }

    #[test]
    fn never_fixed_import_exhausts_budget() {
        let runner = runner(
            ScriptedClient::new()
                .text(component_missing_import())
                .text(component_missing_import())
                .text(component_missing_import()),
        );
        let outcome = runner.run("login card", 2).expect("run");

        assert!(!outcome.approved);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(outcome.retry_count, 2);
        let attempts: Vec<u32> = outcome.attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        for record in &outcome.attempts {
            assert_eq!(record.reason, RULE_BASED_REASON);
            assert_eq!(record.verdict.violations, vec![MISSING_IMPORT.to_string()]);
        }
        // One generation plus two corrections; the rule stage never calls the model.
        assert_eq!(runner.client.call_count(), 3);
    }

    #[test]
    fn semantic_rejection_drives_a_correction() {
        let runner = runner(
            ScriptedClient::new()
                .text(valid_component())
                .verdict(&layout_rejection())
                .text(valid_component())
                .verdict(&Verdict::approved()),
        );
        let outcome = runner.run("login card", 2).expect("run");

        assert!(outcome.approved);
        assert_eq!(outcome.retry_count, 1);
        assert_eq!(outcome.attempts.len(), outcome.retry_count as usize + 1);
        assert_eq!(outcome.attempts[0].verdict, layout_rejection());
        assert_eq!(
            outcome.last_attempt().map(|a| a.approved),
            Some(outcome.approved)
        );

        let correction = &runner.client.requests()[2];
        let task = correction.user_prompt();
        assert!(task.contains("Card is not centered.\nButton label is vague."));
        assert!(task.contains("login card"));
    }

    #[test]
    fn full_budget_stays_within_model_call_bound() {
        let mut client = ScriptedClient::new().text(valid_component());
        for _ in 0..3 {
            client = client.verdict(&layout_rejection()).text(valid_component());
        }
        client = client.verdict(&layout_rejection());
        let runner = runner(client);

        let outcome = runner.run("login card", 3).expect("run");
        assert!(!outcome.approved);
        assert_eq!(outcome.attempts.len(), 4);
        // One generation, three corrections and four semantic validations.
        assert_eq!(runner.client.call_count(), 8);
        assert_eq!(runner.client.remaining(), 0);
    }

    #[test]
    fn zero_retries_validates_once() {
        let runner = runner(ScriptedClient::new().text(component_missing_import()));
        let outcome = runner.run("login card", 0).expect("run");
        assert!(!outcome.approved);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.retry_count, 0);
    }

    #[test]
    fn on_attempt_sees_every_record_in_order() {
        let runner = runner(
            ScriptedClient::new()
                .text(component_missing_import())
                .text(valid_component())
                .verdict(&Verdict::approved()),
        );
        let mut seen = Vec::new();
        let outcome = runner
            .run_with("login card", 2, |record| seen.push((record.attempt, record.approved)))
            .expect("run");
        assert_eq!(seen, vec![(1, false), (2, true)]);
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[test]
    fn generation_failure_aborts_the_session() {
        let runner = runner(ScriptedClient::new().failure("network unreachable"));
        let err = runner.run("login card", 2).unwrap_err();
        assert_eq!(err.stage(), "generate");
    }

    #[test]
    fn correction_failure_aborts_the_session() {
        let runner = runner(
            ScriptedClient::new()
                .text(component_missing_import())
                .text("  "),
        );
        let err = runner.run("login card", 2).unwrap_err();
        assert!(matches!(err, ForgeError::Correction { attempt: 1, .. }));
    }

    #[test]
    fn malformed_verdict_aborts_instead_of_rejecting() {
        let runner = runner(
            ScriptedClient::new()
                .text(valid_component())
                .text("not a verdict"),
        );
        let err = runner.run("login card", 2).unwrap_err();
        assert!(matches!(err, ForgeError::Validation { attempt: 1, .. }));
    }

    #[test]
    fn oversized_retry_budget_is_rejected_before_any_call() {
        let runner = runner(ScriptedClient::new());
        let err = runner.run("login card", MAX_RETRIES_LIMIT + 1).unwrap_err();
        assert!(matches!(err, ForgeError::RetryBudget { .. }));
        assert_eq!(runner.client.call_count(), 0);
    }

    #[test]
    fn approved_code_stays_approved_under_the_rule_stage() {
        let runner = runner(
            ScriptedClient::new()
                .text(valid_component())
                .verdict(&Verdict::approved()),
        );
        let outcome = runner.run("login card", 1).expect("run");
        assert!(outcome.approved);
        assert!(runner.validator.rules_only(&outcome.final_code).approved);
    }

    #[test]
    fn refine_starts_a_fresh_session_from_a_composite_prompt() {
        let runner = runner(
            ScriptedClient::new()
                .text(valid_component())
                .verdict(&Verdict::approved()),
        );
        let request = RefineRequest {
            original_prompt: "login card".to_string(),
            existing_code: "export class OldCard {}".to_string(),
            instructions: "add a remember-me checkbox".to_string(),
        };
        let outcome = runner.refine(&request, 2).expect("refine");

        assert!(outcome.approved);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.user_prompt.contains("login card"));
        assert!(outcome.user_prompt.contains("export class OldCard {}"));
        assert!(outcome.user_prompt.contains("add a remember-me checkbox"));

        let generation = runner.client.requests()[0].user_prompt();
        assert!(generation.contains("add a remember-me checkbox"));
    }
}

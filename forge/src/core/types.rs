//! Shared deterministic types for the generation loop.
//!
//! These types define the contracts between the loop stages. They hold no
//! handles to external services and serialize to stable JSON for session logs.

use serde::{Deserialize, Serialize};

/// Reason attached to every verdict produced by the deterministic stage.
pub const RULE_BASED_REASON: &str = "Rule-based validation failed.";

/// Structured outcome of validating one code artifact.
///
/// Wire names follow the structured-output contract given to the model
/// (`schemas/verdict.schema.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    #[serde(rename = "reason_for_disapproval", default)]
    pub reason: String,
    #[serde(rename = "error_points", default)]
    pub violations: Vec<String>,
}

impl Verdict {
    pub fn approved() -> Self {
        Self {
            approved: true,
            reason: String::new(),
            violations: Vec::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>, violations: Vec<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            violations,
        }
    }

    /// Returns a description of the broken invariant, if any.
    ///
    /// An approved verdict must carry neither a reason nor violations.
    pub fn invariant_violation(&self) -> Option<String> {
        if !self.approved {
            return None;
        }
        if !self.violations.is_empty() {
            return Some(format!(
                "approved verdict lists {} violation(s)",
                self.violations.len()
            ));
        }
        if !self.reason.trim().is_empty() {
            return Some("approved verdict carries a disapproval reason".to_string());
        }
        None
    }

    /// Violations joined one per line, as fed back to the corrector.
    pub fn error_log(&self) -> String {
        self.violations.join("\n")
    }
}

/// Snapshot of one validation pass within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based, equal to the retry counter at validation time plus one.
    pub attempt: u32,
    pub code: String,
    pub approved: bool,
    pub reason: String,
    pub verdict: Verdict,
}

/// States of the generation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Generate,
    Validate,
    Correct,
    Done,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Generate => "generate",
            LoopState::Validate => "validate",
            LoopState::Correct => "correct",
            LoopState::Done => "done",
        }
    }
}

/// Mutable state of one generation run.
///
/// Stages mutate it in place; [`Session::finish`] consumes it into an
/// immutable [`SessionOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_prompt: String,
    pub current_code: String,
    pub approved: bool,
    /// 0-based; incremented once per correction.
    pub retry_count: u32,
    /// Violations from the most recent validation.
    pub error_points: Vec<String>,
    pub reason: String,
    pub attempts: Vec<AttemptRecord>,
}

impl Session {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            current_code: String::new(),
            approved: false,
            retry_count: 0,
            error_points: Vec::new(),
            reason: String::new(),
            attempts: Vec::new(),
        }
    }

    /// Store a verdict for the current code and append its attempt record.
    pub fn record_verdict(&mut self, verdict: Verdict) -> &AttemptRecord {
        self.approved = verdict.approved;
        self.error_points = verdict.violations.clone();
        self.reason = verdict.reason.clone();
        let index = self.attempts.len();
        self.attempts.push(AttemptRecord {
            attempt: self.retry_count + 1,
            code: self.current_code.clone(),
            approved: verdict.approved,
            reason: verdict.reason.clone(),
            verdict,
        });
        &self.attempts[index]
    }

    /// Replace the current code with a corrected artifact.
    pub fn apply_correction(&mut self, code: String) {
        self.current_code = code;
        self.retry_count += 1;
    }

    pub fn finish(self) -> SessionOutcome {
        SessionOutcome {
            user_prompt: self.user_prompt,
            final_code: self.current_code,
            approved: self.approved,
            retry_count: self.retry_count,
            attempts: self.attempts,
        }
    }
}

/// Terminal result of a session.
///
/// `approved == false` with a full attempt history is a normal outcome
/// (retries exhausted), distinct from a fatal [`crate::error::ForgeError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub user_prompt: String,
    pub final_code: String,
    pub approved: bool,
    pub retry_count: u32,
    pub attempts: Vec<AttemptRecord>,
}

impl SessionOutcome {
    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}

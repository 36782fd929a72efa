//! Loop stages that talk to the model: generation, correction and validation.
//!
//! Agents are plain values built once from the policy and the prompt engine and
//! passed into the loop explicitly. The completion client is supplied per call,
//! so one set of agents can serve independent sessions.

use std::sync::Arc;

use crate::io::policy::DesignPolicy;
use crate::io::prompt::PromptEngine;

pub mod corrector;
pub mod generator;
pub mod validator;

pub use corrector::Corrector;
pub use generator::Generator;
pub use validator::Validator;

/// Read-only inputs shared by every agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub policy: Arc<DesignPolicy>,
    pub prompts: Arc<PromptEngine>,
}

impl AgentContext {
    pub fn new(policy: Arc<DesignPolicy>, prompts: Arc<PromptEngine>) -> Self {
        Self { policy, prompts }
    }

    /// Policy directive block, rendered fresh for each prompt.
    pub(crate) fn design_rules(&self) -> String {
        self.policy.format_for_prompt()
    }
}

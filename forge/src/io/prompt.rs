//! Prompt templates with an explicit placeholder contract.
//!
//! Every template declares the placeholders it expects. The engine refuses to
//! start when a template references a name outside its contract or leaves a
//! declared one unused, and refuses to render when a declared value is missing
//! or an unknown value is supplied. Rendering uses strict undefined behavior,
//! so a drifted name can never render as an empty string.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, anyhow, bail};
use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");
const VALIDATION_TEMPLATE: &str = include_str!("prompts/validation.md");
const REFINE_TEMPLATE: &str = include_str!("prompts/refine.md");

/// The prompt templates shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromptKind {
    /// System instruction shared by generation and correction.
    System,
    Generator,
    Correction,
    Validation,
    /// Composite prompt for refining an existing component.
    Refine,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] = [
        PromptKind::System,
        PromptKind::Generator,
        PromptKind::Correction,
        PromptKind::Validation,
        PromptKind::Refine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PromptKind::System => "system",
            PromptKind::Generator => "generator",
            PromptKind::Correction => "correction",
            PromptKind::Validation => "validation",
            PromptKind::Refine => "refine",
        }
    }

    fn source(self) -> &'static str {
        match self {
            PromptKind::System => SYSTEM_TEMPLATE,
            PromptKind::Generator => GENERATOR_TEMPLATE,
            PromptKind::Correction => CORRECTION_TEMPLATE,
            PromptKind::Validation => VALIDATION_TEMPLATE,
            PromptKind::Refine => REFINE_TEMPLATE,
        }
    }

    /// Placeholders the template must reference, and the only ones it may.
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            PromptKind::System => &[],
            PromptKind::Generator => &["design_rules", "user_prompt"],
            PromptKind::Correction => &[
                "design_rules",
                "user_prompt",
                "previous_code",
                "error_logs",
            ],
            PromptKind::Validation => &["design_rules", "generated_code"],
            PromptKind::Refine => &["original_prompt", "existing_code", "instructions"],
        }
    }
}

/// Named values for one render call.
#[derive(Debug, Clone, Default)]
pub struct PromptVars {
    values: BTreeMap<&'static str, String>,
}

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Load the shipped templates and check each against its contract.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for kind in PromptKind::ALL {
            register_template(&mut env, kind.name(), kind.source(), kind.placeholders())?;
        }
        Ok(Self { env })
    }

    /// Render `kind` with exactly its declared placeholders.
    pub fn render(&self, kind: PromptKind, vars: &PromptVars) -> Result<String> {
        let expected: BTreeSet<&str> = kind.placeholders().iter().copied().collect();
        let supplied: BTreeSet<&str> = vars.values.keys().copied().collect();

        let missing: Vec<&str> = expected.difference(&supplied).copied().collect();
        if !missing.is_empty() {
            bail!(
                "template '{}' is missing values for: {}",
                kind.name(),
                missing.join(", ")
            );
        }
        let unknown: Vec<&str> = supplied.difference(&expected).copied().collect();
        if !unknown.is_empty() {
            bail!(
                "template '{}' does not declare: {}",
                kind.name(),
                unknown.join(", ")
            );
        }

        let template = self.env.get_template(kind.name())?;
        let rendered = template
            .render(&vars.values)
            .with_context(|| format!("render template '{}'", kind.name()))?;
        debug!(template = kind.name(), bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

/// Add a template to `env` after checking its referenced variables against
/// `placeholders`.
fn register_template(
    env: &mut Environment<'static>,
    name: &'static str,
    source: &'static str,
    placeholders: &[&str],
) -> Result<()> {
    env.add_template(name, source)
        .with_context(|| format!("parse template '{name}'"))?;
    let template = env.get_template(name)?;
    let referenced: BTreeSet<String> = template.undeclared_variables(false).into_iter().collect();
    let declared: BTreeSet<String> = placeholders.iter().map(|p| p.to_string()).collect();

    let undeclared: Vec<&String> = referenced.difference(&declared).collect();
    let unused: Vec<&String> = declared.difference(&referenced).collect();
    if !undeclared.is_empty() || !unused.is_empty() {
        return Err(anyhow!(
            "template '{name}' drifted from its contract (undeclared: {undeclared:?}, unused: {unused:?})"
        ));
    }
    Ok(())
}

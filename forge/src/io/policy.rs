//! Design-system policy loaded from a static JSON document.
//!
//! The document is checked against `schemas/design_system.schema.json` before
//! it is parsed, so a missing key fails the load instead of producing a
//! partial policy. Once loaded the policy is read-only and can be shared
//! across sessions behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ForgeError;
use crate::io::schema::validate_schema;

const DESIGN_SYSTEM_SCHEMA: &str = include_str!("../../schemas/design_system.schema.json");

/// Named colors. The four roles are mandatory; any extra role is also allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPalette {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub text: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ColorPalette {
    /// `(role, value)` pairs with the mandatory roles first.
    pub fn roles(&self) -> Vec<(&str, &str)> {
        let mut roles = vec![
            ("Primary", self.primary.as_str()),
            ("Secondary", self.secondary.as_str()),
            ("Background", self.background.as_str()),
            ("Text", self.text.as_str()),
        ];
        roles.extend(
            self.extra
                .iter()
                .map(|(role, value)| (role.as_str(), value.as_str())),
        );
        roles
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderRadius {
    pub default: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontRules {
    pub family: String,
}

/// Raw document shape (`design-system.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignTokens {
    pub colors: ColorPalette,
    pub border_radius: BorderRadius,
    pub font: FontRules,
}

/// Immutable rule set every generated component must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignPolicy {
    tokens: DesignTokens,
    allowed_colors: BTreeSet<String>,
}

impl DesignPolicy {
    /// Load and check the policy document at `path`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ForgeError> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
            .map_err(|source| ForgeError::PolicyLoad {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&raw).map_err(|source| ForgeError::PolicyLoad {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a policy from document text.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("parse design system json")?;
        validate_schema(&value, DESIGN_SYSTEM_SCHEMA).context("check design system document")?;
        let tokens: DesignTokens =
            serde_json::from_value(value).context("parse design system tokens")?;
        let policy = Self::from_tokens(tokens);
        debug!(
            colors = policy.allowed_colors.len(),
            radius = %policy.tokens.border_radius.default,
            "design policy loaded"
        );
        Ok(policy)
    }

    pub fn from_tokens(tokens: DesignTokens) -> Self {
        let allowed_colors = tokens
            .colors
            .roles()
            .into_iter()
            .map(|(_, value)| value.to_string())
            .collect();
        Self {
            tokens,
            allowed_colors,
        }
    }

    /// Normalized color values accepted by the deterministic checks.
    pub fn allowed_colors(&self) -> &BTreeSet<String> {
        &self.allowed_colors
    }

    pub fn default_radius(&self) -> &str {
        &self.tokens.border_radius.default
    }

    pub fn font_family(&self) -> &str {
        &self.tokens.font.family
    }

    /// Render the rule set as a directive block for model prompts.
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::from("You must strictly follow this design system:\n\nAllowed Colors:\n");
        for (role, value) in self.tokens.colors.roles() {
            out.push_str(&format!("{role}: {value}\n"));
        }
        out.push_str(&format!(
            "\nBorder Radius:\nDefault: {}\n\nFont Family:\n{}\n\n",
            self.default_radius(),
            self.font_family()
        ));
        out.push_str("Do not use any other colors, radius, or fonts.\n");
        out
    }
}

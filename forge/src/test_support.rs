//! Test-only helpers: a scripted completion client and component fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::types::Verdict;
use crate::io::completion::{Completion, CompletionClient, CompletionRequest};
use crate::io::policy::DesignPolicy;

const SHIPPED_POLICY: &str = include_str!("../design/design-system.json");

/// Completion client that replays queued responses in order and records
/// every request it receives. Running out of responses is an error.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: RefCell<VecDeque<Result<Completion>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.push(Ok(Completion::Text(text.into())))
    }

    pub fn structured(self, value: Value) -> Self {
        self.push(Ok(Completion::Structured(value)))
    }

    pub fn verdict(self, verdict: &Verdict) -> Self {
        match serde_json::to_value(verdict) {
            Ok(value) => self.structured(value),
            Err(err) => self.push(Err(err.into())),
        }
    }

    pub fn failure(self, message: &str) -> Self {
        self.push(Err(anyhow!("{message}")))
    }

    fn push(self, response: Result<Completion>) -> Self {
        self.responses.borrow_mut().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted client has no responses left")))
    }
}

/// The design system shipped in `design/design-system.json`.
pub fn shipped_policy() -> DesignPolicy {
    DesignPolicy::from_json(SHIPPED_POLICY).expect("shipped policy parses")
}

/// Copy of the shipped design system in a fresh temporary directory.
pub fn shipped_policy_file() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("design-system.json");
    fs::write(&path, SHIPPED_POLICY).expect("write policy");
    (dir, path)
}

/// Policy whose palette only uses `#123456` and `#ffffff`.
pub fn two_color_policy() -> DesignPolicy {
    DesignPolicy::from_json(
        r##"{
            "colors": {
                "primary": "#123456",
                "secondary": "#ffffff",
                "background": "#ffffff",
                "text": "#123456"
            },
            "borderRadius": { "default": "4px" },
            "font": { "family": "Roboto, sans-serif" }
        }"##,
    )
    .expect("two-color policy parses")
}

/// Component that passes every deterministic check under [`shipped_policy`].
pub fn valid_component() -> String {
    r#"import { Component } from '@angular/core';

@Component({
  selector: 'app-login-card',
  standalone: true,
  template: `
    <section class="card">
      <h2>Sign in</h2>
      <button type="submit">Continue</button>
    </section>
  `,
  styles: [`
    .card { background: #C9D8CF; color: #0E1A2B; border-radius: 8px; font-family: Inter, sans-serif; }
    button { background: #1E5B47; color: #C9D8CF; }
  `],
})
export class LoginCardComponent {}"#
        .to_string()
}

/// [`valid_component`] without the `@angular/core` import line.
pub fn component_missing_import() -> String {
    valid_component()
        .lines()
        .skip(2)
        .collect::<Vec<_>>()
        .join("\n")
}

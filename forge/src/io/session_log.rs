//! Session artifacts written after a run.
//!
//! ```text
//! <dir>/component.ts
//! <dir>/session.json
//! <dir>/attempts/<n>/code.ts
//! <dir>/attempts/<n>/verdict.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{SessionOutcome, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary<'a> {
    pub user_prompt: &'a str,
    pub approved: bool,
    pub retry_count: u32,
    pub attempts: Vec<AttemptSummary<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary<'a> {
    pub attempt: u32,
    pub approved: bool,
    pub reason: &'a str,
    pub error_points: &'a [String],
}

impl<'a> SessionSummary<'a> {
    pub fn from_outcome(outcome: &'a SessionOutcome) -> Self {
        Self {
            user_prompt: &outcome.user_prompt,
            approved: outcome.approved,
            retry_count: outcome.retry_count,
            attempts: outcome
                .attempts
                .iter()
                .map(|record| AttemptSummary {
                    attempt: record.attempt,
                    approved: record.approved,
                    reason: &record.reason,
                    error_points: &record.verdict.violations,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub component_path: PathBuf,
    pub summary_path: PathBuf,
}

impl SessionPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            component_path: dir.join("component.ts"),
            summary_path: dir.join("session.json"),
        }
    }

    pub fn attempt_dir(&self, attempt: u32) -> PathBuf {
        self.dir.join("attempts").join(attempt.to_string())
    }
}

/// Write the final component, a summary and every attempt under `dir`.
pub fn write_session(dir: &Path, outcome: &SessionOutcome) -> Result<SessionPaths> {
    let paths = SessionPaths::new(dir);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create session dir {}", paths.dir.display()))?;

    write_code(&paths.component_path, &outcome.final_code)?;
    write_json(&paths.summary_path, &SessionSummary::from_outcome(outcome))?;
    for record in &outcome.attempts {
        let attempt_dir = paths.attempt_dir(record.attempt);
        fs::create_dir_all(&attempt_dir)
            .with_context(|| format!("create attempt dir {}", attempt_dir.display()))?;
        write_code(&attempt_dir.join("code.ts"), &record.code)?;
        write_json::<Verdict>(&attempt_dir.join("verdict.json"), &record.verdict)?;
    }

    debug!(dir = %paths.dir.display(), attempts = outcome.attempts.len(), "session written");
    Ok(paths)
}

fn write_code(path: &Path, code: &str) -> Result<()> {
    let mut buf = code.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Session, Verdict};
    use serde_json::Value;

    fn outcome() -> SessionOutcome {
        let mut session = Session::new("login card");
        session.current_code = "export class A {}".to_string();
        session.record_verdict(Verdict::rejected(
            "Rule-based validation failed.",
            vec!["Missing @Component decorator.".to_string()],
        ));
        session.apply_correction("@Component export class A {}".to_string());
        session.record_verdict(Verdict::approved());
        session.finish()
    }

    #[test]
    fn writes_component_summary_and_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = write_session(temp.path(), &outcome()).expect("write");

        let component = fs::read_to_string(&paths.component_path).expect("component");
        assert_eq!(component, "@Component export class A {}\n");

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(&paths.summary_path).expect("summary"))
                .expect("json");
        assert_eq!(summary["approved"], true);
        assert_eq!(summary["retry_count"], 1);
        assert_eq!(summary["attempts"][0]["attempt"], 1);
        assert_eq!(
            summary["attempts"][0]["error_points"][0],
            "Missing @Component decorator."
        );

        let first = paths.attempt_dir(1);
        assert_eq!(
            fs::read_to_string(first.join("code.ts")).expect("code"),
            "export class A {}\n"
        );
        let verdict: Verdict =
            serde_json::from_str(&fs::read_to_string(first.join("verdict.json")).expect("verdict"))
                .expect("parse");
        assert!(!verdict.approved);
        assert!(paths.attempt_dir(2).join("verdict.json").exists());
        assert!(!paths.attempt_dir(3).exists());
    }
}

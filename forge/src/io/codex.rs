//! Completion backend that drives an agent CLI (`codex exec` by default).
//!
//! The rendered prompt goes to the child's stdin. JSON requests write the
//! response schema to a scratch file and pass it with `--output-schema`; the
//! final answer is always read back from the `--output-last-message` file.
//!
//! The CLI's structured-output mode needs every property listed as required,
//! so the file holds a strict copy of the schema. Answers are still checked
//! against the original schema by the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::completion::{
    Completion, CompletionClient, CompletionRequest, ResponseFormat, parse_json_answer,
};
use crate::io::process::run_command_with_timeout;

const STDERR_TAIL_BYTES: usize = 2_000;

static CALL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CodexSettings {
    /// Program followed by its fixed arguments.
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Parent directory for per-call schema and answer files.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CodexClient {
    settings: CodexSettings,
}

impl CodexClient {
    pub fn new(settings: CodexSettings) -> Result<Self> {
        if settings.command.first().is_none_or(|p| p.trim().is_empty()) {
            bail!("codex command must be a non-empty array");
        }
        Ok(Self { settings })
    }

    fn call_dir(&self) -> PathBuf {
        let seq = CALL_SEQ.fetch_add(1, Ordering::Relaxed);
        self.settings
            .scratch_dir
            .join(format!("call-{}-{seq}", std::process::id()))
    }

    fn build_command(&self, schema_path: Option<&Path>, answer_path: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.command[0]);
        cmd.args(&self.settings.command[1..]);
        if let Some(schema_path) = schema_path {
            cmd.arg("--output-schema").arg(schema_path);
        }
        cmd.arg("--output-last-message").arg(answer_path).arg("-");
        cmd
    }

    fn run_in(&self, dir: &Path, request: &CompletionRequest) -> Result<Completion> {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let answer_path = dir.join("answer.txt");
        let schema_path = match request.format {
            ResponseFormat::Text => None,
            ResponseFormat::Json { schema } => {
                let path = dir.join("output.schema.json");
                fs::write(&path, strict_output_schema(schema)?)
                    .with_context(|| format!("write schema {}", path.display()))?;
                Some(path)
            }
        };

        let prompt = render_prompt(request);
        let output = run_command_with_timeout(
            self.build_command(schema_path.as_deref(), &answer_path),
            Some(prompt.as_bytes()),
            self.settings.timeout,
            self.settings.output_limit_bytes,
        )
        .context("run codex")?;

        if output.timed_out {
            return Err(anyhow!("codex timed out after {:?}", self.settings.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex failed");
            return Err(anyhow!(
                "codex failed with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(STDERR_TAIL_BYTES)
            ));
        }
        if !answer_path.exists() {
            return Err(anyhow!("missing codex output {}", answer_path.display()));
        }
        let answer = fs::read_to_string(&answer_path)
            .with_context(|| format!("read codex output {}", answer_path.display()))?;
        debug!(bytes = answer.len(), "codex answered");

        match request.format {
            ResponseFormat::Text => Ok(Completion::Text(answer)),
            ResponseFormat::Json { .. } => Ok(Completion::Structured(parse_json_answer(&answer)?)),
        }
    }
}

impl CompletionClient for CodexClient {
    #[instrument(skip_all, fields(timeout_secs = self.settings.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let dir = self.call_dir();
        info!(dir = %dir.display(), "starting codex");
        let result = self.run_in(&dir, request);
        if let Err(err) = fs::remove_dir_all(&dir) {
            debug!(err = %err, dir = %dir.display(), "scratch cleanup failed");
        }
        result
    }
}

/// Copy of `schema` whose objects list every property as required.
fn strict_output_schema(schema: &str) -> Result<String> {
    let mut value: Value = serde_json::from_str(schema).context("parse output schema")?;
    require_all_properties(&mut value);
    serde_json::to_string_pretty(&value).context("serialize output schema")
}

fn require_all_properties(node: &mut Value) {
    let Some(object) = node.as_object_mut() else {
        return;
    };
    if let Some(Value::Object(properties)) = object.get_mut("properties") {
        let names: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
        properties.values_mut().for_each(require_all_properties);
        object.insert("required".to_string(), Value::Array(names));
    }
    if let Some(items) = object.get_mut("items") {
        require_all_properties(items);
    }
}

/// The CLI takes a single prompt, so system instructions lead the task text.
fn render_prompt(request: &CompletionRequest) -> String {
    match request.system_prompt() {
        Some(system) => format!(
            "<instructions>\n{system}\n</instructions>\n\n{}",
            request.user_prompt()
        ),
        None => request.user_prompt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

    /// Stand-in CLI: finds `--output-last-message <path>` in its arguments,
    /// then writes `body` (with `$schema_seen` expanded) to that path.
    fn fake_cli(body: &str) -> Vec<String> {
        let script = format!(
            r#"out=""; schema_seen=no
while [ $# -gt 0 ]; do
  case "$1" in
    --output-last-message) shift; out="$1" ;;
    --output-schema) shift; [ -f "$1" ] && schema_seen=yes ;;
  esac
  shift
done
prompt=$(cat)
printf '%s' "{body}" > "$out""#
        );
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script,
            "fake-codex".to_string(),
        ]
    }

    fn client(command: Vec<String>, scratch: &Path) -> CodexClient {
        CodexClient::new(CodexSettings {
            command,
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
            scratch_dir: scratch.to_path_buf(),
        })
        .expect("client")
    }

    #[test]
    fn text_answer_is_read_from_last_message_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = client(fake_cli("export class A {}"), temp.path());
        let completion = client
            .complete(&CompletionRequest::text("sys", "task", 0.2))
            .expect("complete");
        assert_eq!(completion, Completion::Text("export class A {}".to_string()));
        // Scratch files are removed after each call.
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn json_request_passes_schema_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let body = r#"{\"approved\": false, \"reason_for_disapproval\": \"$schema_seen\", \"error_points\": []}"#;
        let client = client(fake_cli(body), temp.path());
        let completion = client
            .complete(&CompletionRequest::json("sys", "task", 0.0, VERDICT_SCHEMA))
            .expect("complete");
        let Completion::Structured(value) = completion else {
            panic!("expected structured completion");
        };
        assert_eq!(value["reason_for_disapproval"], "yes");
    }

    #[test]
    fn schema_file_requires_every_property() {
        let strict: Value =
            serde_json::from_str(&strict_output_schema(VERDICT_SCHEMA).expect("strict"))
                .expect("parse");
        let mut required: Vec<&str> = strict["required"]
            .as_array()
            .expect("required array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        required.sort_unstable();
        assert_eq!(
            required,
            vec!["approved", "error_points", "reason_for_disapproval"]
        );
        assert_eq!(strict["additionalProperties"], false);

        let lenient: Value = serde_json::from_str(VERDICT_SCHEMA).expect("parse");
        assert_eq!(lenient["required"], serde_json::json!(["approved"]));
    }

    #[test]
    fn failing_cli_reports_status_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'not logged in' >&2; exit 3".to_string(),
        ];
        let err = client(command, temp.path())
            .complete(&CompletionRequest::text("sys", "task", 0.2))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Some(3)"), "{message}");
        assert!(message.contains("not logged in"), "{message}");
    }

    #[test]
    fn missing_answer_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null".to_string()];
        let err = client(command, temp.path())
            .complete(&CompletionRequest::text("sys", "task", 0.2))
            .unwrap_err();
        assert!(err.to_string().contains("missing codex output"));
    }

    #[test]
    fn prompt_puts_instructions_first() {
        let prompt = render_prompt(&CompletionRequest::text("SYS", "TASK", 0.2));
        assert!(prompt.starts_with("<instructions>\nSYS"));
        assert!(prompt.ends_with("TASK"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = CodexClient::new(CodexSettings {
            command: Vec::new(),
            timeout: Duration::from_secs(1),
            output_limit_bytes: 10,
            scratch_dir: temp.path().to_path_buf(),
        });
        assert!(result.is_err());
    }
}

//! `forge`: generate, refine and validate design-system-compliant Angular components.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forge::agents::{AgentContext, Validator};
use forge::core::types::{AttemptRecord, SessionOutcome};
use forge::exit_codes;
use forge::io::completion::CompletionClient;
use forge::io::config::{DEFAULT_CONFIG_PATH, ForgeConfig, load_config};
use forge::io::policy::DesignPolicy;
use forge::io::prompt::PromptEngine;
use forge::io::session_log::write_session;
use forge::{RefineRequest, SessionRunner, logging};

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Generate Angular components that follow a fixed design system"
)]
struct Cli {
    /// Path to the TOML config. Defaults apply when the file is missing.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a component from a prompt and print the final code.
    Generate {
        prompt: String,
        /// Corrections allowed after the first validation.
        #[arg(long)]
        max_retries: Option<u32>,
        /// Write the component and every attempt under this directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Revise an existing component in a fresh session.
    Refine {
        /// The request the existing component was generated from.
        #[arg(long)]
        original: String,
        /// File holding the existing component.
        #[arg(long)]
        code: PathBuf,
        instructions: String,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate a component file and print the verdict as JSON.
    Validate {
        file: PathBuf,
        /// Run only the deterministic checks (no model call).
        #[arg(long)]
        rules_only: bool,
    },
    /// Print the design-system block given to the model.
    Policy,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    match cli.command {
        Command::Generate {
            prompt,
            max_retries,
            out,
        } => cmd_generate(&cfg, &prompt, max_retries, out.as_deref()),
        Command::Refine {
            original,
            code,
            instructions,
            max_retries,
            out,
        } => {
            let existing_code =
                fs::read_to_string(&code).with_context(|| format!("read {}", code.display()))?;
            let request = RefineRequest {
                original_prompt: original,
                existing_code,
                instructions,
            };
            cmd_refine(&cfg, &request, max_retries, out.as_deref())
        }
        Command::Validate { file, rules_only } => cmd_validate(&cfg, &file, rules_only),
        Command::Policy => {
            let policy = DesignPolicy::load(&cfg.policy_path)?;
            print!("{}", policy.format_for_prompt());
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_generate(
    cfg: &ForgeConfig,
    prompt: &str,
    max_retries: Option<u32>,
    out: Option<&Path>,
) -> Result<i32> {
    let runner = build_runner(cfg)?;
    let outcome = runner.run_with(
        prompt,
        max_retries.unwrap_or(cfg.max_retries),
        report_attempt,
    )?;
    finish(&outcome, out)
}

fn cmd_refine(
    cfg: &ForgeConfig,
    request: &RefineRequest,
    max_retries: Option<u32>,
    out: Option<&Path>,
) -> Result<i32> {
    let runner = build_runner(cfg)?;
    let outcome = runner.refine_with(
        request,
        max_retries.unwrap_or(cfg.max_retries),
        report_attempt,
    )?;
    finish(&outcome, out)
}

fn cmd_validate(cfg: &ForgeConfig, file: &Path, rules_only: bool) -> Result<i32> {
    let code = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let policy = Arc::new(DesignPolicy::load(&cfg.policy_path)?);
    let ctx = AgentContext::new(policy, Arc::new(PromptEngine::new()?));
    let validator = Validator::new(ctx, cfg.sampling.validation_temperature);

    let verdict = if rules_only {
        validator.rules_only(&code)
    } else {
        let client = cfg.build_client()?;
        validator.validate(&client, &code, 1)?
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&verdict).context("serialize verdict")?
    );
    Ok(if verdict.approved {
        exit_codes::OK
    } else {
        exit_codes::REJECTED
    })
}

fn build_runner(cfg: &ForgeConfig) -> Result<SessionRunner<Box<dyn CompletionClient>>> {
    let policy = Arc::new(DesignPolicy::load(&cfg.policy_path)?);
    let client = cfg.build_client()?;
    SessionRunner::new(client, policy, cfg.sampling)
}

fn report_attempt(record: &AttemptRecord) {
    if record.approved {
        eprintln!("attempt {}: approved", record.attempt);
        return;
    }
    eprintln!("attempt {}: rejected: {}", record.attempt, record.reason);
    for point in &record.verdict.violations {
        eprintln!("  - {point}");
    }
}

fn finish(outcome: &SessionOutcome, out: Option<&Path>) -> Result<i32> {
    if let Some(dir) = out {
        let paths = write_session(dir, outcome)?;
        eprintln!("session written to {}", paths.dir.display());
    }
    println!("{}", outcome.final_code);
    if outcome.approved {
        Ok(exit_codes::OK)
    } else {
        eprintln!("not approved after {} attempt(s)", outcome.attempts.len());
        Ok(exit_codes::REJECTED)
    }
}

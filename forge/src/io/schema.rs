//! JSON Schema checks for documents and structured model output.

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
///
/// All violations are reported together, one per line.
pub fn validate_schema(instance: &Value, schema_raw: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse json schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

    #[test]
    fn accepts_well_formed_verdict() {
        let verdict = json!({
            "approved": false,
            "reason_for_disapproval": "layout",
            "error_points": ["Button is not centered."]
        });
        validate_schema(&verdict, VERDICT_SCHEMA).expect("valid");
    }

    #[test]
    fn optional_fields_may_be_omitted() {
        validate_schema(&json!({ "approved": true }), VERDICT_SCHEMA).expect("valid");
        assert!(validate_schema(&json!({ "error_points": [] }), VERDICT_SCHEMA).is_err());
    }

    #[test]
    fn reports_every_violation() {
        let verdict = json!({ "approved": "yes", "error_points": "none", "extra": 1 });
        let err = validate_schema(&verdict, VERDICT_SCHEMA).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("schema validation failed"));
        assert!(message.matches("\n- ").count() >= 3, "{message}");
    }
}

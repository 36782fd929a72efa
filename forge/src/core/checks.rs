//! Deterministic rule checks applied before any model-based validation.
//!
//! Checks run in a fixed order and each violated rule contributes one message,
//! except the color rule which reports every unauthorized literal it finds.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

pub const COMPONENT_IMPORT: &str = "import { Component } from '@angular/core';";
pub const COMPONENT_DECORATOR: &str = "@Component";
pub const EXPORTED_CLASS: &str = "export class";
pub const INLINE_STYLE: &str = "style=";

pub const MISSING_IMPORT: &str = "Missing Angular Component import.";
pub const MISSING_DECORATOR: &str = "Missing @Component decorator.";
pub const MISSING_EXPORTED_CLASS: &str = "Missing exported class definition.";
pub const UNBALANCED_BRACES: &str = "Unbalanced curly brackets.";
pub const UNBALANCED_ANGLES: &str = "Unbalanced HTML angle brackets.";
pub const INLINE_STYLES: &str = "Inline styles detected (not allowed).";

static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(?:[0-9a-fA-F]{3}){1,2}").expect("hex color regex"));

/// Every hex color literal in `code`, in order of appearance.
pub fn hex_colors(code: &str) -> Vec<&str> {
    HEX_COLOR_RE.find_iter(code).map(|m| m.as_str()).collect()
}

/// Run every rule against `code` and collect violation messages.
///
/// Color literals must match an allowed value exactly as written.
/// An empty result means the code may proceed to semantic validation.
pub fn rule_violations(code: &str, allowed_colors: &BTreeSet<String>) -> Vec<String> {
    let mut errors = Vec::new();

    if !code.contains(COMPONENT_IMPORT) {
        errors.push(MISSING_IMPORT.to_string());
    }
    if !code.contains(COMPONENT_DECORATOR) {
        errors.push(MISSING_DECORATOR.to_string());
    }
    if !code.contains(EXPORTED_CLASS) {
        errors.push(MISSING_EXPORTED_CLASS.to_string());
    }
    if count_char(code, '{') != count_char(code, '}') {
        errors.push(UNBALANCED_BRACES.to_string());
    }
    if count_char(code, '<') != count_char(code, '>') {
        errors.push(UNBALANCED_ANGLES.to_string());
    }
    if code.contains(INLINE_STYLE) {
        errors.push(INLINE_STYLES.to_string());
    }
    for color in hex_colors(code) {
        if !allowed_colors.contains(color) {
            errors.push(format!("Unauthorized color detected: {color}"));
        }
    }

    errors
}

fn count_char(code: &str, needle: char) -> usize {
    code.chars().filter(|c| *c == needle).count()
}

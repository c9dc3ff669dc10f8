//! Parsing of `NAME=value` environment variable strings

use std::collections::HashSet;

use crate::error::{CoreError, Result};

/// Parse `NAME=value` pairs, preserving input order
///
/// The value may itself contain `=`. Names must be unique.
pub fn parse_env_strings<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<(String, String)>> {
    let mut seen = HashSet::new();
    let mut vars = Vec::with_capacity(inputs.len());

    for input in inputs {
        let input = input.as_ref();
        let (name, value) = input.split_once('=').ok_or_else(|| CoreError::InvalidEnvVar {
            input: input.to_string(),
            reason: "please specify a VariableName=Value pair".to_string(),
        })?;

        if name.is_empty() {
            return Err(CoreError::InvalidEnvVar {
                input: input.to_string(),
                reason: "variable name is blank".to_string(),
            });
        }

        if !seen.insert(name.to_string()) {
            return Err(CoreError::InvalidEnvVar {
                input: input.to_string(),
                reason: format!("multiple values found for VariableName: {}", name),
            });
        }

        vars.push((name.to_string(), value.to_string()));
    }

    Ok(vars)
}

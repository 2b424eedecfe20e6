//! Type-token classifier.
//!
//! Two grammars are recognised, tried in this order:
//!
//! 1. `<base><digit?>` with `<base>` one of `float`, `int`, `vec`, `ivec`,
//!    `mat`: scalars, vectors (2–4) and square matrices (2–4);
//! 2. `sampler<digit>D`: 1D, 2D and 3D samplers.
//!
//! Anything else is rejected; there is no fallback type.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ReflectError;
use crate::variable::{BaseType, VariableDescriptor};

fn numeric_grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(float|int|vec|ivec|mat)([0-9]?)$").expect("valid numeric grammar"))
}

fn sampler_grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^sampler([0-9])D$").expect("valid sampler grammar"))
}

/// Classify a raw GLSL type token.
///
/// ```
/// use diffuse_core::{classify, BaseType, VariableDescriptor};
///
/// assert_eq!(classify("ivec3").unwrap(), VariableDescriptor::vector(BaseType::Int, 3));
/// assert!(classify("bool").is_err());
/// ```
pub fn classify(raw_type: &str) -> Result<VariableDescriptor, ReflectError> {
    let unknown = || ReflectError::UnknownType {
        raw_type: raw_type.to_string(),
    };

    if let Some(caps) = numeric_grammar().captures(raw_type) {
        let dimension = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|digit| !digit.is_empty())
            .and_then(|digit| digit.parse::<u8>().ok());

        return match (&caps[1], dimension) {
            ("float", None) => Ok(VariableDescriptor::scalar(BaseType::Float)),
            ("int", None) => Ok(VariableDescriptor::scalar(BaseType::Int)),
            ("vec", Some(d @ 2..=4)) => Ok(VariableDescriptor::vector(BaseType::Float, d)),
            ("ivec", Some(d @ 2..=4)) => Ok(VariableDescriptor::vector(BaseType::Int, d)),
            ("mat", Some(d @ 2..=4)) => Ok(VariableDescriptor::matrix(d)),
            _ => Err(unknown()),
        };
    }

    if let Some(caps) = sampler_grammar().captures(raw_type) {
        return match caps[1].parse::<u8>() {
            Ok(d @ 1..=3) => Ok(VariableDescriptor::sampler(d)),
            _ => Err(unknown()),
        };
    }

    Err(unknown())
}

// ===================================================================
// Tests
// ===================================================================

use std::path::PathBuf;

use diffuse_core::{BaseType, ReflectError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Shader '{shader}' compile error:\n{log}")]
    Compile { shader: String, log: String },
    #[error("Program '{program}' link error:\n{log}")]
    Link { program: String, log: String },
    #[error("Program '{program}': variable '{variable}' has no active location")]
    Location { program: String, variable: String },
    #[error("No such variable '{name}'")]
    UnknownVariable { name: String },
    #[error("Variable '{name}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: BaseType,
        actual: BaseType,
    },
    #[error("Variable '{name}' shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Variable '{name}' {reason}")]
    Kind { name: String, reason: &'static str },
    #[error(transparent)]
    Reflect(#[from] ReflectError),
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),
    #[error("File '{}' not found", .path.display())]
    FileNotFound { path: PathBuf },
    #[error("Program '{program}' is not linked")]
    NotLinked { program: String },
    #[error("Program '{program}': attribute '{variable}' has no buffer bound")]
    UnboundAttribute { program: String, variable: String },
    #[error("Program '{program}': sampler '{variable}' has no texture bound")]
    UnboundSampler { program: String, variable: String },
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

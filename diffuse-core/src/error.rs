use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReflectError {
    #[error("Unknown type '{raw_type}'")]
    UnknownType { raw_type: String },
}

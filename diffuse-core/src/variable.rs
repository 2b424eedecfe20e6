//! Interface variable types: the raw `(name, type)` pair found in shader
//! source, and the structured descriptor the classifier derives from it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One declared `attribute` or `uniform`, exactly as written in the source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderVariable {
    pub name: String,
    /// The type token, e.g. `vec3` or `sampler2D`.
    pub raw_type: String,
}

impl ShaderVariable {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_type: raw_type.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Scalar,
    Vector,
    Matrix,
    Sampler,
}

/// Numeric element type of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Int,
    Float,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Int => f.write_str("int"),
            BaseType::Float => f.write_str("float"),
        }
    }
}

/// Structured form of a GLSL type token.
///
/// `dimension` is 1 for scalars, the component count for vectors, the side
/// of the square for matrices and the coordinate arity for samplers.
/// Samplers report [`BaseType::Int`]: the value uploaded to their location is
/// a texture-unit index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub kind: VariableKind,
    pub base_type: BaseType,
    pub dimension: u8,
}

impl VariableDescriptor {
    pub const fn scalar(base_type: BaseType) -> Self {
        Self {
            kind: VariableKind::Scalar,
            base_type,
            dimension: 1,
        }
    }

    pub const fn vector(base_type: BaseType, dimension: u8) -> Self {
        Self {
            kind: VariableKind::Vector,
            base_type,
            dimension,
        }
    }

    pub const fn matrix(dimension: u8) -> Self {
        Self {
            kind: VariableKind::Matrix,
            base_type: BaseType::Float,
            dimension,
        }
    }

    pub const fn sampler(dimension: u8) -> Self {
        Self {
            kind: VariableKind::Sampler,
            base_type: BaseType::Int,
            dimension,
        }
    }

    /// Number of values a setter must supply for this variable.
    ///
    /// Samplers take a single value (the texture unit).
    pub fn element_count(&self) -> usize {
        let dim = self.dimension as usize;
        match self.kind {
            VariableKind::Scalar | VariableKind::Sampler => 1,
            VariableKind::Vector => dim,
            VariableKind::Matrix => dim * dim,
        }
    }

    pub fn is_sampler(&self) -> bool {
        self.kind == VariableKind::Sampler
    }
}

/// Prints the GLSL token the descriptor was classified from.
impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.base_type) {
            (VariableKind::Scalar, base) => write!(f, "{base}"),
            (VariableKind::Vector, BaseType::Float) => write!(f, "vec{}", self.dimension),
            (VariableKind::Vector, BaseType::Int) => write!(f, "ivec{}", self.dimension),
            (VariableKind::Matrix, _) => write!(f, "mat{}", self.dimension),
            (VariableKind::Sampler, _) => write!(f, "sampler{}D", self.dimension),
        }
    }
}

// ===================================================================
// Tests
// ===================================================================

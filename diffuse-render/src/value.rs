//! Element types and stored uniform values.
//!
//! `f32` and `i32` are the only element types the binding surface accepts.
//! [`Element`] ties each one to its [`BaseType`] so setters can be generic
//! and still type-check against a variable's descriptor.

use bytemuck::Pod;
use diffuse_core::{BaseType, VariableDescriptor};

use crate::backend::UniformData;

/// Largest numeric uniform: a `mat4`.
pub const MAX_UNIFORM_ELEMENTS: usize = 16;

/// A scalar type that can back a buffer or a numeric uniform.
pub trait Element: Pod {
    const BASE_TYPE: BaseType;

    /// Copy `data` into a stored uniform value. Elements past
    /// [`MAX_UNIFORM_ELEMENTS`] are dropped.
    fn to_value(data: &[Self]) -> UniformValue;
}

impl Element for f32 {
    const BASE_TYPE: BaseType = BaseType::Float;

    fn to_value(data: &[Self]) -> UniformValue {
        let len = data.len().min(MAX_UNIFORM_ELEMENTS);
        let mut values = [0.0; MAX_UNIFORM_ELEMENTS];
        values[..len].copy_from_slice(&data[..len]);
        UniformValue::Float { values, len }
    }
}

impl Element for i32 {
    const BASE_TYPE: BaseType = BaseType::Int;

    fn to_value(data: &[Self]) -> UniformValue {
        let len = data.len().min(MAX_UNIFORM_ELEMENTS);
        let mut values = [0; MAX_UNIFORM_ELEMENTS];
        values[..len].copy_from_slice(&data[..len]);
        UniformValue::Int { values, len }
    }
}

/// Fixed-capacity numeric uniform value, tagged by base type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int {
        values: [i32; MAX_UNIFORM_ELEMENTS],
        len: usize,
    },
    Float {
        values: [f32; MAX_UNIFORM_ELEMENTS],
        len: usize,
    },
}

impl UniformValue {
    /// All-zero value shaped for `descriptor`.
    pub fn zeroed(descriptor: &VariableDescriptor) -> Self {
        let len = descriptor.element_count().min(MAX_UNIFORM_ELEMENTS);
        match descriptor.base_type {
            BaseType::Int => UniformValue::Int {
                values: [0; MAX_UNIFORM_ELEMENTS],
                len,
            },
            BaseType::Float => UniformValue::Float {
                values: [0.0; MAX_UNIFORM_ELEMENTS],
                len,
            },
        }
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            UniformValue::Int { .. } => BaseType::Int,
            UniformValue::Float { .. } => BaseType::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UniformValue::Int { len, .. } | UniformValue::Float { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The float elements, or `None` for an int value.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            UniformValue::Float { values, len } => Some(&values[..*len]),
            UniformValue::Int { .. } => None,
        }
    }

    /// The int elements, or `None` for a float value.
    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            UniformValue::Int { values, len } => Some(&values[..*len]),
            UniformValue::Float { .. } => None,
        }
    }

    pub fn as_data(&self) -> UniformData<'_> {
        match self {
            UniformValue::Int { values, len } => UniformData::Int(&values[..*len]),
            UniformValue::Float { values, len } => UniformData::Float(&values[..*len]),
        }
    }
}

// ===================================================================
// Tests
// ===================================================================

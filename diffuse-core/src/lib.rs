//! # diffuse-core
//!
//! GPU-free shader interface reflection.
//!
//! ```text
//!  shader source
//!       │
//!       ▼
//!  extract_interface()   ◀─── attribute/uniform declarations (name + token)
//!       │
//!       ▼
//!  classify()            ◀─── token → {kind, base type, dimension}
//! ```
//!
//! ## Crate modules
//!
//! - [`variable`]: `ShaderVariable` and `VariableDescriptor`
//! - [`extract`]: line-oriented declaration scanner
//! - [`classify`]: type-token classifier
//! - [`error`]: `ReflectError`

pub mod classify;
pub mod error;
pub mod extract;
pub mod variable;

pub use classify::classify;
pub use error::ReflectError;
pub use extract::{extract_interface, Interface};
pub use variable::{BaseType, ShaderVariable, VariableDescriptor, VariableKind};

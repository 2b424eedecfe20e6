//! Linked shader programs and their type-checked variable registries.
//!
//! ## Lifecycle
//!
//! ```text
//!  Program::new ──▶ attach(unit)* ──▶ link ──▶ set_* ──▶ evaluate
//!                        ▲              │
//!                        └── attach / detach invalidates the link
//! ```
//!
//! Every attach or detach re-derives both registries from the attached
//! units: attachment order, then declaration order, keyed by name. A name
//! seen again takes the later descriptor but keeps its first position.
//! Bound values survive re-derivation when the variable keeps the same
//! descriptor. Sampler uniforms get texture units `0..K` in registry order.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use diffuse_core::{classify, BaseType, ShaderVariable, VariableDescriptor};
use hashlink::LinkedHashMap;
use log::{debug, info};

use crate::backend::{Backend, BufferHandle, Location, ProgramHandle, TextureHandle, UniformData};
use crate::error::RenderError;
use crate::resource::{Buffer, Texture};
use crate::shader::ShaderUnit;
use crate::value::{Element, UniformValue};

/// A buffer reference stored on an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub buffer: BufferHandle,
    pub element_type: BaseType,
    /// Scalar element count of the buffer when it was bound.
    pub len: usize,
}

/// The value held by a uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformSlot {
    Numeric(UniformValue),
    Sampler {
        unit: u32,
        texture: Option<TextureHandle>,
    },
}

/// A registry entry: classified type, resolved location, current value.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramVariable<V> {
    pub descriptor: VariableDescriptor,
    /// `Some` only while the program is linked.
    pub location: Option<Location>,
    pub value: V,
}

pub type AttributeVariable = ProgramVariable<Option<AttributeBinding>>;
pub type UniformVariable = ProgramVariable<UniformSlot>;

type Registry<V> = LinkedHashMap<String, ProgramVariable<V>>;

pub struct Program {
    handle: ProgramHandle,
    name: String,
    units: Vec<Rc<ShaderUnit>>,
    attributes: Registry<Option<AttributeBinding>>,
    uniforms: Registry<UniformSlot>,
    linked: bool,
}

impl Program {
    pub fn new(gpu: &mut impl Backend, name: impl Into<String>) -> Result<Self, RenderError> {
        Ok(Self {
            handle: gpu.create_program()?,
            name: name.into(),
            units: Vec::new(),
            attributes: LinkedHashMap::new(),
            uniforms: LinkedHashMap::new(),
            linked: false,
        })
    }

    // ───────────────────── Topology ───────────────────────────────

    /// Attach a compiled unit. On a classification failure the program is
    /// left exactly as it was.
    pub fn attach(&mut self, gpu: &mut impl Backend, unit: &Rc<ShaderUnit>) -> Result<(), RenderError> {
        if self.units.iter().any(|u| Rc::ptr_eq(u, unit)) {
            debug!("program '{}': '{}' already attached", self.name, unit.name());
            return Ok(());
        }

        self.units.push(Rc::clone(unit));
        if let Err(err) = self.rederive() {
            self.units.pop();
            return Err(err);
        }

        gpu.attach_shader(self.handle, unit.handle());
        self.invalidate();
        debug!(
            "program '{}': attached '{}' ({} attributes, {} uniforms)",
            self.name,
            unit.name(),
            self.attributes.len(),
            self.uniforms.len()
        );
        Ok(())
    }

    /// Detach a unit. Detaching a unit that is not attached does nothing.
    pub fn detach(&mut self, gpu: &mut impl Backend, unit: &Rc<ShaderUnit>) -> Result<(), RenderError> {
        let Some(index) = self.units.iter().position(|u| Rc::ptr_eq(u, unit)) else {
            return Ok(());
        };

        let removed = self.units.remove(index);
        if let Err(err) = self.rederive() {
            self.units.insert(index, removed);
            return Err(err);
        }

        gpu.detach_shader(self.handle, unit.handle());
        self.invalidate();
        Ok(())
    }

    pub fn link(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        self.invalidate();

        let status = gpu.link_program(self.handle);
        let log = status.log.trim();
        if !status.success {
            info!("program '{}' link log:\n{log}", self.name);
            return Err(RenderError::Link {
                program: self.name.clone(),
                log: status.log,
            });
        }
        if !log.is_empty() {
            info!("program '{}' linked:\n{log}", self.name);
        }

        if let Err(err) = self.resolve_locations(gpu) {
            self.invalidate();
            return Err(err);
        }
        self.linked = true;
        Ok(())
    }

    fn resolve_locations(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        let handle = self.handle;
        for (name, variable) in self.attributes.iter_mut() {
            let location = gpu.attribute_location(handle, name).ok_or_else(|| RenderError::Location {
                program: self.name.clone(),
                variable: name.clone(),
            })?;
            variable.location = Some(location);
        }
        for (name, variable) in self.uniforms.iter_mut() {
            let location = gpu.uniform_location(handle, name).ok_or_else(|| RenderError::Location {
                program: self.name.clone(),
                variable: name.clone(),
            })?;
            variable.location = Some(location);
        }
        Ok(())
    }

    fn invalidate(&mut self) {
        self.linked = false;
        for variable in self.attributes.values_mut() {
            variable.location = None;
        }
        for variable in self.uniforms.values_mut() {
            variable.location = None;
        }
    }

    /// Rebuild both registries from the attached units.
    fn rederive(&mut self) -> Result<(), RenderError> {
        let attribute_types = collect_types(self.units.iter().flat_map(|u| u.attributes()))?;
        let uniform_types = collect_types(self.units.iter().flat_map(|u| u.uniforms()))?;

        let mut attributes = LinkedHashMap::new();
        for (name, descriptor) in attribute_types {
            let value = self
                .attributes
                .get(&name)
                .filter(|old| old.descriptor == descriptor)
                .and_then(|old| old.value);
            attributes.insert(
                name,
                ProgramVariable {
                    descriptor,
                    location: None,
                    value,
                },
            );
        }

        let mut uniforms = LinkedHashMap::new();
        let mut next_unit = 0u32;
        for (name, descriptor) in uniform_types {
            let previous = self
                .uniforms
                .get(&name)
                .filter(|old| old.descriptor == descriptor)
                .map(|old| old.value);
            let value = if descriptor.is_sampler() {
                let texture = match previous {
                    Some(UniformSlot::Sampler { texture, .. }) => texture,
                    _ => None,
                };
                let unit = next_unit;
                next_unit += 1;
                UniformSlot::Sampler { unit, texture }
            } else {
                previous.unwrap_or_else(|| UniformSlot::Numeric(UniformValue::zeroed(&descriptor)))
            };
            uniforms.insert(
                name,
                ProgramVariable {
                    descriptor,
                    location: None,
                    value,
                },
            );
        }

        self.attributes = attributes;
        self.uniforms = uniforms;
        Ok(())
    }

    // ───────────────────── Setters ────────────────────────────────

    /// Bind `buffer` to an attribute. Only the reference is stored; the
    /// contents are read when the program is evaluated.
    pub fn set_attribute(&mut self, name: &str, buffer: &Buffer) -> Result<(), RenderError> {
        let variable = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| unknown(name))?;
        if buffer.element_type() != variable.descriptor.base_type {
            return Err(RenderError::TypeMismatch {
                name: name.to_string(),
                expected: variable.descriptor.base_type,
                actual: buffer.element_type(),
            });
        }
        variable.value = Some(AttributeBinding {
            buffer: buffer.handle(),
            element_type: buffer.element_type(),
            len: buffer.len(),
        });
        Ok(())
    }

    /// Copy `data` into a numeric uniform.
    pub fn set_uniform<T: Element>(&mut self, name: &str, data: &[T]) -> Result<(), RenderError> {
        let variable = self.uniforms.get_mut(name).ok_or_else(|| unknown(name))?;
        let UniformSlot::Numeric(stored) = &mut variable.value else {
            return Err(RenderError::Kind {
                name: name.to_string(),
                reason: "is a sampler and takes a texture",
            });
        };

        let expected = variable.descriptor.element_count();
        if data.len() != expected {
            return Err(RenderError::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        if T::BASE_TYPE != variable.descriptor.base_type {
            return Err(RenderError::TypeMismatch {
                name: name.to_string(),
                expected: variable.descriptor.base_type,
                actual: T::BASE_TYPE,
            });
        }

        *stored = T::to_value(data);
        Ok(())
    }

    pub fn set_uniform_scalar<T: Element>(&mut self, name: &str, value: T) -> Result<(), RenderError> {
        self.set_uniform(name, std::slice::from_ref(&value))
    }

    pub fn set_uniform_texture(&mut self, name: &str, texture: &Texture) -> Result<(), RenderError> {
        let variable = self.uniforms.get_mut(name).ok_or_else(|| unknown(name))?;
        match &mut variable.value {
            UniformSlot::Sampler { texture: slot, .. } => {
                *slot = Some(texture.handle());
                Ok(())
            }
            UniformSlot::Numeric(_) => Err(RenderError::Kind {
                name: name.to_string(),
                reason: "is not a sampler",
            }),
        }
    }

    // ───────────────────── Getters ────────────────────────────────

    /// The stored value of a numeric uniform.
    pub fn uniform_value(&self, name: &str) -> Result<&UniformValue, RenderError> {
        match &self.uniform(name)?.value {
            UniformSlot::Numeric(value) => Ok(value),
            UniformSlot::Sampler { .. } => Err(RenderError::Kind {
                name: name.to_string(),
                reason: "is a sampler and holds no numeric value",
            }),
        }
    }

    pub fn attribute(&self, name: &str) -> Result<&AttributeVariable, RenderError> {
        self.attributes.get(name).ok_or_else(|| unknown(name))
    }

    pub fn uniform(&self, name: &str) -> Result<&UniformVariable, RenderError> {
        self.uniforms.get(name).ok_or_else(|| unknown(name))
    }

    /// Attributes in registry order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeVariable)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Uniforms in registry order.
    pub fn uniforms(&self) -> impl Iterator<Item = (&str, &UniformVariable)> {
        self.uniforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn units(&self) -> &[Rc<ShaderUnit>] {
        &self.units
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // ───────────────────── Draw ───────────────────────────────────

    /// Upload every uniform, bind every attribute and issue one draw.
    ///
    /// All validation happens before the first backend call. Binding state
    /// (program, enabled attribute slots) is undone on every exit path.
    pub fn evaluate<G: Backend>(&self, gpu: &mut G) -> Result<(), RenderError> {
        if !self.linked {
            return Err(RenderError::NotLinked {
                program: self.name.clone(),
            });
        }
        let vertex_count = self.vertex_count()?;
        if let Some((name, _)) = self
            .uniforms
            .iter()
            .find(|(_, v)| matches!(v.value, UniformSlot::Sampler { texture: None, .. }))
        {
            return Err(RenderError::UnboundSampler {
                program: self.name.clone(),
                variable: name.clone(),
            });
        }

        let mut scope = BindingScope::new(gpu);
        scope.use_program(Some(self.handle));

        for (name, variable) in &self.uniforms {
            let location = self.location_of(name, variable.location)?;
            match variable.value {
                UniformSlot::Numeric(ref value) => {
                    scope.upload_uniform(location, variable.descriptor, value.as_data());
                }
                UniformSlot::Sampler { unit, texture } => {
                    let Some(texture) = texture else { continue };
                    scope.bind_texture_unit(unit, texture);
                    scope.upload_uniform(location, variable.descriptor, UniformData::Int(&[unit as i32]));
                }
            }
        }

        for (name, variable) in &self.attributes {
            let location = self.location_of(name, variable.location)?;
            let Some(binding) = variable.value else { continue };
            scope.enable(location);
            scope.attribute_pointer(location, binding.buffer, variable.descriptor);
        }

        match vertex_count {
            Some(count) => scope.draw_triangles(count),
            None => {
                debug!("program '{}' has no attributes; nothing drawn", self.name);
                Ok(())
            }
        }
    }

    /// Shared vertex count of the bound attribute buffers, or `None` when
    /// the program has no attributes. Each buffer is measured in its own
    /// attribute's per-vertex element count.
    fn vertex_count(&self) -> Result<Option<usize>, RenderError> {
        let mut shared: Option<usize> = None;
        for (name, variable) in &self.attributes {
            let binding = variable.value.ok_or_else(|| RenderError::UnboundAttribute {
                program: self.name.clone(),
                variable: name.clone(),
            })?;
            let per_vertex = variable.descriptor.element_count().max(1);
            if binding.len % per_vertex != 0 {
                return Err(RenderError::ShapeMismatch {
                    name: name.clone(),
                    expected: binding.len / per_vertex * per_vertex,
                    actual: binding.len,
                });
            }

            let vertices = binding.len / per_vertex;
            match shared {
                None => shared = Some(vertices),
                Some(count) if count != vertices => {
                    return Err(RenderError::ShapeMismatch {
                        name: name.clone(),
                        expected: count * per_vertex,
                        actual: binding.len,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(shared)
    }

    fn location_of(&self, name: &str, location: Option<Location>) -> Result<Location, RenderError> {
        location.ok_or_else(|| RenderError::Location {
            program: self.name.clone(),
            variable: name.to_string(),
        })
    }

    /// One line per variable: name, resolved location, base type and
    /// element count. Attributes first.
    pub fn describe(&self) -> String {
        let attributes = self.attributes().map(|(name, v)| ("attribute", name, v.descriptor, v.location));
        let uniforms = self.uniforms().map(|(name, v)| ("uniform", name, v.descriptor, v.location));
        attributes
            .chain(uniforms)
            .map(|(role, name, descriptor, location)| {
                let location = location.map_or_else(|| "-".to_string(), |l| l.0.to_string());
                format!(
                    "{role} '{name}': location={location}, type={}, size={}\n",
                    descriptor.base_type,
                    descriptor.element_count()
                )
            })
            .collect()
    }

    /// Detach every unit and delete the backend program.
    pub fn release(self, gpu: &mut impl Backend) {
        for unit in &self.units {
            gpu.detach_shader(self.handle, unit.handle());
        }
        gpu.delete_program(self.handle);
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("units", &self.units.iter().map(|u| u.name()).collect::<Vec<_>>())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("uniforms", &self.uniforms.keys().collect::<Vec<_>>())
            .field("linked", &self.linked)
            .finish()
    }
}

fn unknown(name: &str) -> RenderError {
    RenderError::UnknownVariable {
        name: name.to_string(),
    }
}

/// Classify declarations into name → descriptor, last declaration wins,
/// first position kept.
fn collect_types<'a>(
    declarations: impl Iterator<Item = &'a ShaderVariable>,
) -> Result<LinkedHashMap<String, VariableDescriptor>, RenderError> {
    let mut types = LinkedHashMap::new();
    for declaration in declarations {
        let descriptor = classify(&declaration.raw_type)?;
        match types.get_mut(&declaration.name) {
            Some(existing) => *existing = descriptor,
            None => {
                types.insert(declaration.name.clone(), descriptor);
            }
        }
    }
    Ok(types)
}

// ───────────────────────────────────────────────────────────────────
// Binding scope
// ───────────────────────────────────────────────────────────────────

/// Tracks the attribute slots enabled during a draw and undoes them, along
/// with the program binding, when dropped.
struct BindingScope<'a, G: Backend> {
    gpu: &'a mut G,
    enabled: Vec<Location>,
}

impl<'a, G: Backend> BindingScope<'a, G> {
    fn new(gpu: &'a mut G) -> Self {
        Self {
            gpu,
            enabled: Vec::new(),
        }
    }

    fn enable(&mut self, location: Location) {
        self.gpu.enable_attribute(location);
        self.enabled.push(location);
    }
}

impl<G: Backend> Deref for BindingScope<'_, G> {
    type Target = G;

    fn deref(&self) -> &G {
        self.gpu
    }
}

impl<G: Backend> DerefMut for BindingScope<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.gpu
    }
}

impl<G: Backend> Drop for BindingScope<'_, G> {
    fn drop(&mut self) {
        for location in self.enabled.drain(..) {
            self.gpu.disable_attribute(location);
        }
        self.gpu.use_program(None);
    }
}

// ===================================================================
// Tests
// ===================================================================

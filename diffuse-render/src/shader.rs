//! A single compiled shader stage and the interface it declares.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use diffuse_core::{extract_interface, Interface, ShaderVariable};
use log::{debug, info, warn};

use crate::backend::{Backend, ShaderHandle, ShaderStage};
use crate::error::RenderError;

/// One shader stage: backend object, source and extracted interface.
///
/// Built with `new` → `load_source` → `compile`, then shared between
/// programs as an `Rc<ShaderUnit>`. The convenience constructors
/// [`from_source`](Self::from_source) and [`from_file`](Self::from_file)
/// run the whole sequence.
#[derive(Debug)]
pub struct ShaderUnit {
    handle: ShaderHandle,
    stage: ShaderStage,
    name: String,
    interface: Interface,
    compiled: bool,
}

impl ShaderUnit {
    pub fn new(gpu: &mut impl Backend, stage: ShaderStage, name: impl Into<String>) -> Result<Self, RenderError> {
        let handle = gpu.create_shader(stage)?;
        Ok(Self {
            handle,
            stage,
            name: name.into(),
            interface: Interface::default(),
            compiled: false,
        })
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Hand `source` to the backend and extract its declarations.
    pub fn load_source(&mut self, gpu: &mut impl Backend, source: &str) {
        gpu.shader_source(self.handle, source);
        self.interface = extract_interface(source);
        self.compiled = false;
        debug!(
            "shader '{}': {} attributes, {} uniforms",
            self.name,
            self.interface.attributes.len(),
            self.interface.uniforms.len()
        );
    }

    /// Read `path` whole and load it. The unit takes the path as its name.
    pub fn load_source_from_file(&mut self, gpu: &mut impl Backend, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            debug!("reading '{}': {err}", path.display());
            RenderError::FileNotFound {
                path: path.to_path_buf(),
            }
        })?;
        self.name = path.display().to_string();
        self.load_source(gpu, &source);
        Ok(())
    }

    pub fn compile(&mut self, gpu: &mut impl Backend) -> Result<(), RenderError> {
        let status = gpu.compile_shader(self.handle);
        let log = status.log.trim();
        self.compiled = status.success;

        if !status.success {
            info!("shader '{}' compile log:\n{log}", self.name);
            return Err(RenderError::Compile {
                shader: self.name.clone(),
                log: status.log,
            });
        }
        if !log.is_empty() {
            warn!("shader '{}' compiled with warnings:\n{log}", self.name);
        }
        Ok(())
    }

    /// Create, load and compile in one step.
    pub fn from_source(
        gpu: &mut impl Backend,
        stage: ShaderStage,
        name: impl Into<String>,
        source: &str,
    ) -> Result<Rc<Self>, RenderError> {
        let mut unit = Self::new(gpu, stage, name)?;
        unit.load_source(gpu, source);
        if let Err(err) = unit.compile(gpu) {
            unit.release(gpu);
            return Err(err);
        }
        Ok(Rc::new(unit))
    }

    /// Create, load from `path` and compile in one step.
    pub fn from_file(gpu: &mut impl Backend, stage: ShaderStage, path: impl AsRef<Path>) -> Result<Rc<Self>, RenderError> {
        let mut unit = Self::new(gpu, stage, String::new())?;
        let built = unit
            .load_source_from_file(gpu, path)
            .and_then(|()| unit.compile(gpu));
        if let Err(err) = built {
            unit.release(gpu);
            return Err(err);
        }
        Ok(Rc::new(unit))
    }

    pub fn attributes(&self) -> &[ShaderVariable] {
        &self.interface.attributes
    }

    pub fn uniforms(&self) -> &[ShaderVariable] {
        &self.interface.uniforms
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ShaderHandle {
        self.handle
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Delete the backend object. Programs still holding the unit keep a
    /// dangling handle; release them first.
    pub fn release(self, gpu: &mut impl Backend) {
        gpu.delete_shader(self.handle);
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;
    use std::io::Write;

    const VERTEX: &str = "attribute vec2 a_vertex;\nuniform mat4 u_mvp;\nvoid main() {}\n";

    #[test]
    fn test_load_source_extracts_interface() {
        let mut gpu = HeadlessBackend::new();
        let mut unit = ShaderUnit::new(&mut gpu, ShaderStage::Vertex, "quad").unwrap();
        unit.load_source(&mut gpu, VERTEX);

        assert_eq!(unit.attributes(), &[ShaderVariable::new("a_vertex", "vec2")]);
        assert_eq!(unit.uniforms(), &[ShaderVariable::new("u_mvp", "mat4")]);
        assert!(!unit.is_compiled());
        unit.compile(&mut gpu).unwrap();
        assert!(unit.is_compiled());
        assert_eq!(gpu.shader_stage(unit.handle()), Some(ShaderStage::Vertex));
    }

    #[test]
    fn test_compile_error_carries_log() {
        let mut gpu = HeadlessBackend::new();
        let mut unit = ShaderUnit::new(&mut gpu, ShaderStage::Fragment, "broken").unwrap();
        unit.load_source(&mut gpu, "void main() {}\n#error missing semicolon\n");

        match unit.compile(&mut gpu).unwrap_err() {
            RenderError::Compile { shader, log } => {
                assert_eq!(shader, "broken");
                assert!(log.contains("missing semicolon"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_source_releases_on_failure() {
        let mut gpu = HeadlessBackend::new();
        let err = ShaderUnit::from_source(&mut gpu, ShaderStage::Vertex, "empty", "   ").unwrap_err();
        assert!(matches!(err, RenderError::Compile { .. }));
        assert_eq!(gpu.live_objects(), 0);
    }

    #[test]
    fn test_from_file_renames_unit() {
        let mut gpu = HeadlessBackend::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VERTEX.as_bytes()).unwrap();

        let unit = ShaderUnit::from_file(&mut gpu, ShaderStage::Vertex, file.path()).unwrap();
        assert_eq!(unit.name(), file.path().display().to_string());
        assert_eq!(unit.attributes().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let mut gpu = HeadlessBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.vert");

        let err = ShaderUnit::from_file(&mut gpu, ShaderStage::Vertex, &path).unwrap_err();
        match err {
            RenderError::FileNotFound { path: reported } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gpu.live_objects(), 0);
    }
}

//! Program integration tests.
//!
//! Verifies, against the headless backend:
//! - Interface reflection across a vertex + fragment pair
//! - Type and shape checking on the setter surface
//! - Re-link requirement after a topology change
//! - Loading shader sources from disk

use std::io::Write;
use std::rc::Rc;

use diffuse_core::{BaseType, VariableDescriptor, VariableKind};
use diffuse_render::backend::headless::{Command, UniformRecord};
use diffuse_render::{Buffer, HeadlessBackend, Program, RenderError, ShaderStage, ShaderUnit};

const VERTEX: &str = "\
#version 120
attribute vec2 a_vertex;   // clip-space position
varying vec2 v_uv;
void main() {
    v_uv = a_vertex * 0.5 + 0.5;
    gl_Position = vec4(a_vertex, 0.0, 1.0);
}
";

const FRAGMENT: &str = "\
#version 120
uniform vec4 u_map;
uniform  vec2   u_offset ;
varying vec2 v_uv;
// uniform float u_commented;
void main() {
    gl_FragColor = u_map * vec4(v_uv + u_offset, 0.0, 1.0);
}
";

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build(gpu: &mut HeadlessBackend) -> (Program, Rc<ShaderUnit>, Rc<ShaderUnit>) {
    let vertex = ShaderUnit::from_source(gpu, ShaderStage::Vertex, "map.vert", VERTEX).unwrap();
    let fragment = ShaderUnit::from_source(gpu, ShaderStage::Fragment, "map.frag", FRAGMENT).unwrap();
    let mut program = Program::new(gpu, "map").unwrap();
    program.attach(gpu, &vertex).unwrap();
    program.attach(gpu, &fragment).unwrap();
    program.link(gpu).unwrap();
    (program, vertex, fragment)
}

// ─── Reflection ──────────────────────────────────────────────────────────────

#[test]
fn test_end_to_end_interface() {
    init_logging();
    let mut gpu = HeadlessBackend::new();
    let (mut program, _, _) = build(&mut gpu);

    let attributes: Vec<_> = program.attributes().map(|(n, v)| (n, v.descriptor)).collect();
    assert_eq!(
        attributes,
        [("a_vertex", VariableDescriptor::vector(BaseType::Float, 2))]
    );

    let uniforms: Vec<_> = program.uniforms().map(|(n, v)| (n, v.descriptor)).collect();
    assert_eq!(
        uniforms,
        [
            ("u_map", VariableDescriptor::vector(BaseType::Float, 4)),
            ("u_offset", VariableDescriptor::vector(BaseType::Float, 2)),
        ]
    );

    program.set_uniform("u_map", &[1.0f32, 0.5, 0.25, 1.0]).unwrap();
    assert!(matches!(
        program.set_uniform("u_map", &[1.0f32, 0.5, 0.25]),
        Err(RenderError::ShapeMismatch { expected: 4, actual: 3, .. })
    ));
    assert!(matches!(
        program.set_uniform_scalar("u_nothing", 1.0f32),
        Err(RenderError::UnknownVariable { .. })
    ));
}

#[test]
fn test_wrong_length_is_always_shape_mismatch() {
    let mut gpu = HeadlessBackend::new();
    let (mut program, _, _) = build(&mut gpu);

    for len in [0usize, 1, 3, 5, 16] {
        let data = vec![0.0f32; len];
        assert!(
            matches!(
                program.set_uniform("u_map", &data),
                Err(RenderError::ShapeMismatch { expected: 4, .. })
            ),
            "length {len}"
        );
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[test]
fn test_evaluate_uploads_current_values() {
    init_logging();
    let mut gpu = HeadlessBackend::new();
    let (mut program, _, _) = build(&mut gpu);
    let quad = Buffer::new(&mut gpu, &[-1.0f32, -1.0, 1.0, -1.0, -1.0, 1.0]).unwrap();

    program.set_attribute("a_vertex", &quad).unwrap();
    program.set_uniform("u_map", &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    program.set_uniform("u_offset", &[0.5f32, -0.5]).unwrap();
    gpu.clear_commands();
    program.evaluate(&mut gpu).unwrap();

    let uploads: Vec<UniformRecord> = gpu
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::Uniform { value, .. } => Some(value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        uploads,
        [
            UniformRecord::Float(vec![1.0, 2.0, 3.0, 4.0]),
            UniformRecord::Float(vec![0.5, -0.5]),
        ]
    );
    assert!(gpu.commands().iter().any(|c| matches!(
        c,
        Command::AttributePointer { descriptor, .. }
            if descriptor.kind == VariableKind::Vector && descriptor.dimension == 2
    )));
    assert!(gpu
        .commands()
        .contains(&Command::Draw { program: program.handle(), target: None, vertex_count: 3 }));
    assert_eq!(gpu.enabled_attribute_count(), 0);
}

#[test]
fn test_attach_after_link_invalidates() {
    let mut gpu = HeadlessBackend::new();
    let (mut program, _, _) = build(&mut gpu);
    let quad = Buffer::new(&mut gpu, &[0.0f32; 6]).unwrap();
    program.set_attribute("a_vertex", &quad).unwrap();
    program.evaluate(&mut gpu).unwrap();

    let extra = ShaderUnit::from_source(
        &mut gpu,
        ShaderStage::Fragment,
        "extra.frag",
        "uniform float u_gain;\nvoid main() {}\n",
    )
    .unwrap();
    program.attach(&mut gpu, &extra).unwrap();
    assert!(!program.is_linked());
    assert!(matches!(program.evaluate(&mut gpu), Err(RenderError::NotLinked { .. })));

    program.link(&mut gpu).unwrap();
    // The attribute binding survived the re-derivation.
    program.evaluate(&mut gpu).unwrap();
    assert_eq!(gpu.draw_count(), 2);
}

#[test]
fn test_shared_unit_across_programs() {
    let mut gpu = HeadlessBackend::new();
    let vertex = ShaderUnit::from_source(&mut gpu, ShaderStage::Vertex, "map.vert", VERTEX).unwrap();

    let mut first = Program::new(&mut gpu, "first").unwrap();
    let mut second = Program::new(&mut gpu, "second").unwrap();
    first.attach(&mut gpu, &vertex).unwrap();
    second.attach(&mut gpu, &vertex).unwrap();
    first.link(&mut gpu).unwrap();
    second.link(&mut gpu).unwrap();

    assert_eq!(Rc::strong_count(&vertex), 3);
    first.release(&mut gpu);
    assert_eq!(Rc::strong_count(&vertex), 2);
    assert!(second.attribute("a_vertex").is_ok());
}

// ─── Files ───────────────────────────────────────────────────────────────────

#[test]
fn test_units_from_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vertex_path = dir.path().join("map.vert");
    let fragment_path = dir.path().join("map.frag");
    std::fs::File::create(&vertex_path)
        .unwrap()
        .write_all(VERTEX.as_bytes())
        .unwrap();
    std::fs::write(&fragment_path, FRAGMENT).unwrap();

    let mut gpu = HeadlessBackend::new();
    let vertex = ShaderUnit::from_file(&mut gpu, ShaderStage::Vertex, &vertex_path).unwrap();
    let fragment = ShaderUnit::from_file(&mut gpu, ShaderStage::Fragment, &fragment_path).unwrap();
    assert_eq!(fragment.name(), fragment_path.display().to_string());

    let mut program = Program::new(&mut gpu, "files").unwrap();
    program.attach(&mut gpu, &vertex).unwrap();
    program.attach(&mut gpu, &fragment).unwrap();
    program.link(&mut gpu).unwrap();
    assert_eq!(program.uniforms().count(), 2);

    let missing = ShaderUnit::from_file(&mut gpu, ShaderStage::Vertex, dir.path().join("nope.vert"));
    assert!(matches!(missing, Err(RenderError::FileNotFound { .. })));
}

#[test]
fn test_compile_failure_reports_shader_name() {
    init_logging();
    let mut gpu = HeadlessBackend::new();
    let err = ShaderUnit::from_source(
        &mut gpu,
        ShaderStage::Fragment,
        "broken.frag",
        "void main() {\n#error not yet\n}\n",
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Shader 'broken.frag' compile error:\nERROR: 0:2: '#error' : not yet"
    );
}

//! Declaration scanner for shader source.
//!
//! Every line is stripped of its `//` comment (preprocessor lines are
//! dropped whole), the remaining source is split into statements at `;`,
//! `{` and `}`, and each `;`-terminated statement is matched against
//!
//! ```text
//! attribute [precision] <type> <name>;
//! uniform   [precision] <type> <name>;
//! ```
//!
//! Tokens may be separated by any whitespace, newlines included. Statements
//! that start with one of the keywords but whose type or name cannot be
//! isolated (arrays, blocks, missing tokens) are skipped. No preprocessing
//! is performed. Duplicate declarations are reported as-is.

use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::variable::ShaderVariable;

fn declaration_grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(attribute|uniform)\s+(?:(?:lowp|mediump|highp)\s+)?([A-Za-z_][A-Za-z0-9_]*)\s+([A-Za-z_][A-Za-z0-9_]*)\s*$",
        )
        .expect("valid declaration grammar")
    })
}

fn keyword_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(attribute|uniform)\b").expect("valid keyword prefix"))
}

/// Attribute and uniform declarations of one shader, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub attributes: Vec<ShaderVariable>,
    pub uniforms: Vec<ShaderVariable>,
}

impl Interface {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.uniforms.is_empty()
    }

    /// Iterate over every declared name, attributes first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .chain(self.uniforms.iter())
            .map(|v| v.name.as_str())
    }
}

/// Scan `source` for interface declarations.
pub fn extract_interface(source: &str) -> Interface {
    let mut interface = Interface::default();

    let code = source
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return "";
            }
            match line.find("//") {
                Some(idx) => &line[..idx],
                None => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut line_no = 1;
    for piece in code.split_inclusive([';', '{', '}']) {
        let first_line = line_no + piece[..piece.len() - piece.trim_start().len()].matches('\n').count();
        line_no += piece.matches('\n').count();

        // Only ';'-terminated pieces can be declarations.
        let Some(statement) = piece.strip_suffix(';') else {
            if keyword_prefix().is_match(piece) {
                debug!("skipping declaration on line {first_line}: '{}'", piece.trim());
            }
            continue;
        };

        if let Some(caps) = declaration_grammar().captures(statement) {
            let var = ShaderVariable::new(&caps[3], &caps[2]);
            match &caps[1] {
                "attribute" => interface.attributes.push(var),
                _ => interface.uniforms.push(var),
            }
        } else if keyword_prefix().is_match(statement) {
            debug!("skipping declaration on line {first_line}: '{}'", statement.trim());
        }
    }

    interface
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(vars: &[ShaderVariable]) -> Vec<(&str, &str)> {
        vars.iter()
            .map(|v| (v.name.as_str(), v.raw_type.as_str()))
            .collect()
    }

    #[test]
    fn test_extract_basic_declarations() {
        let src = "attribute vec2 a_vertex;\n\
                   uniform vec4 u_map;\n\
                   uniform vec2 u_offset;\n\
                   void main() { gl_Position = vec4(a_vertex, 0.0, 1.0); }\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.attributes), vec![("a_vertex", "vec2")]);
        assert_eq!(
            pairs(&iface.uniforms),
            vec![("u_map", "vec4"), ("u_offset", "vec2")]
        );
    }

    #[test]
    fn test_extract_tolerates_whitespace_and_trailing_comments() {
        let src = "  \tuniform   mat4\t u_transform ;   // model-view\n\
                   attribute\tvec3  a_normal;/* packed */\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.uniforms), vec![("u_transform", "mat4")]);
        assert_eq!(pairs(&iface.attributes), vec![("a_normal", "vec3")]);
    }

    #[test]
    fn test_extract_skips_commented_out_lines() {
        let src = "// uniform float u_disabled;\nuniform float u_enabled;\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.uniforms), vec![("u_enabled", "float")]);
    }

    #[test]
    fn test_extract_skips_malformed_declarations() {
        let src = "uniform vec3;\n\
                   uniform float u_weights[4];\n\
                   uniform vec2 u_missing_semicolon\n\
                   uniform Light { vec3 dir; };\n\
                   uniform int u_ok;\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.uniforms), vec![("u_ok", "int")]);
        assert!(iface.attributes.is_empty());
    }

    #[test]
    fn test_extract_declaration_spanning_lines() {
        let src = "uniform vec2\n    u_offset;\nattribute\n vec2 a_v;\n\
                   uniform // trailing note\n  float u_gain;\n";
        let iface = extract_interface(src);
        assert_eq!(
            pairs(&iface.uniforms),
            vec![("u_offset", "vec2"), ("u_gain", "float")]
        );
        assert_eq!(pairs(&iface.attributes), vec![("a_v", "vec2")]);
    }

    #[test]
    fn test_extract_after_directives_and_function_bodies() {
        let src = "#version 120\n\
                   attribute vec2 a_vertex;\n\
                   float shade(float x) { return x; }\n\
                   uniform float u_level;\n\
                   uniform Light { vec3 dir; };\n\
                   void main() {}\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.attributes), vec![("a_vertex", "vec2")]);
        assert_eq!(pairs(&iface.uniforms), vec![("u_level", "float")]);
    }

    #[test]
    fn test_extract_keeps_duplicates_in_order() {
        let src = "uniform float u_x;\nuniform vec2 u_x;\n";
        let iface = extract_interface(src);
        assert_eq!(pairs(&iface.uniforms), vec![("u_x", "float"), ("u_x", "vec2")]);
    }

    #[test]
    fn test_extract_precision_qualifier_and_multiple_per_line() {
        let src = "uniform highp float u_a; uniform sampler2D u_tex;\n";
        let iface = extract_interface(src);
        assert_eq!(
            pairs(&iface.uniforms),
            vec![("u_a", "float"), ("u_tex", "sampler2D")]
        );
    }

    #[test]
    fn test_extract_ignores_identifiers_containing_keywords() {
        let src = "float uniformity; vec2 attribute_like = vec2(0.0);\nmy_uniform vec2 x;\n";
        assert!(extract_interface(src).is_empty());
    }

    #[test]
    fn test_interface_names() {
        let iface = extract_interface("uniform float u_b;\nattribute vec2 a_a;\n");
        assert_eq!(iface.names().collect::<Vec<_>>(), vec!["a_a", "u_b"]);
    }
}

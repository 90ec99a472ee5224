//! Scene description authoring
//!
//! A small in-memory model of USD layers (prim specs with typed attributes,
//! relationships and composition arcs) plus a USDA text serializer.

pub mod layer;
pub mod names;
pub mod writer;

use std::fmt;

pub use layer::{Attribute, Layer, LayerMetadata, PrimSpec, Property, Reference, Specifier};
pub use names::{sanitize_identifier, NameCache};

/// Absolute prim path such as `/robot/base_link`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimPath(String);

impl PrimPath {
    /// The pseudo-root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Path of a root prim
    pub fn from_root(name: &str) -> Self {
        Self::root().child(name)
    }

    pub fn child(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("/{}", name))
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Self(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Last path element; empty for the pseudo-root
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Path elements from the root down
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// `other` relative to this path, when it lies below it
    pub fn strip_prefix<'a>(&self, other: &'a PrimPath) -> Option<Vec<&'a str>> {
        let mut mine = self.components();
        let rest: Vec<&str> = other.components().collect();
        let mut i = 0;
        for component in mine.by_ref() {
            if rest.get(i) != Some(&component) {
                return None;
            }
            i += 1;
        }
        Some(rest[i..].to_vec())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Property path such as `/robot/Looks/red/Shader.outputs:surface`
    pub fn property(&self, name: &str) -> String {
        format!("{}.{}", self.0, name)
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Token(String),
    String(String),
    Asset(String),
    Float3([f32; 3]),
    Double3([f64; 3]),
    Point3f([f32; 3]),
    Vector3f([f32; 3]),
    Color3f([f32; 3]),
    /// Real part first: `(w, x, y, z)`
    Quatf([f32; 4]),
    IntArray(Vec<i32>),
    TokenArray(Vec<String>),
    Float3Array(Vec<[f32; 3]>),
    Point3fArray(Vec<[f32; 3]>),
    Normal3fArray(Vec<[f32; 3]>),
    TexCoord2fArray(Vec<[f32; 2]>),
}

impl Value {
    pub fn token(value: impl Into<String>) -> Self {
        Value::Token(value.into())
    }

    /// USD type name used when declaring the attribute
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Token(_) => "token",
            Value::String(_) => "string",
            Value::Asset(_) => "asset",
            Value::Float3(_) => "float3",
            Value::Double3(_) => "double3",
            Value::Point3f(_) => "point3f",
            Value::Vector3f(_) => "vector3f",
            Value::Color3f(_) => "color3f",
            Value::Quatf(_) => "quatf",
            Value::IntArray(_) => "int[]",
            Value::TokenArray(_) => "token[]",
            Value::Float3Array(_) => "float3[]",
            Value::Point3fArray(_) => "point3f[]",
            Value::Normal3fArray(_) => "normal3f[]",
            Value::TexCoord2fArray(_) => "texCoord2f[]",
        }
    }
}

//! Layers and prim specs

use std::path::Path;

use super::writer::UsdaWriter;
use super::{PrimPath, Value};
use crate::error::AssetWriteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specifier {
    Def,
    Over,
    Class,
}

impl Specifier {
    pub fn keyword(&self) -> &'static str {
        match self {
            Specifier::Def => "def",
            Specifier::Over => "over",
            Specifier::Class => "class",
        }
    }
}

/// An attribute opinion: a value, a connection, or only a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub type_name: &'static str,
    pub value: Option<Value>,
    /// Target property path of an input/output connection
    pub connection: Option<String>,
    pub uniform: bool,
    pub custom: bool,
    pub interpolation: Option<&'static str>,
}

impl Attribute {
    pub fn new(value: Value) -> Self {
        Self {
            type_name: value.type_name(),
            value: Some(value),
            connection: None,
            uniform: false,
            custom: false,
            interpolation: None,
        }
    }

    /// Declared without a value, e.g. `token outputs:surface`
    pub fn declared(type_name: &'static str) -> Self {
        Self {
            type_name,
            value: None,
            connection: None,
            uniform: false,
            custom: false,
            interpolation: None,
        }
    }

    pub fn connected(type_name: &'static str, target: impl Into<String>) -> Self {
        Self {
            connection: Some(target.into()),
            ..Self::declared(type_name)
        }
    }

    pub fn uniform(mut self) -> Self {
        self.uniform = true;
        self
    }

    pub fn custom(mut self) -> Self {
        self.custom = true;
        self
    }

    pub fn interpolation(mut self, interpolation: &'static str) -> Self {
        self.interpolation = Some(interpolation);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Attribute(Attribute),
    Relationship(Vec<PrimPath>),
}

/// Reference or payload arc: an asset path plus an optional target prim
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub asset: String,
    pub prim: Option<PrimPath>,
}

impl Reference {
    pub fn new(asset: impl Into<String>, prim: Option<PrimPath>) -> Self {
        Self {
            asset: asset.into(),
            prim,
        }
    }
}

/// Opinions about one prim within one layer
#[derive(Debug, Clone, PartialEq)]
pub struct PrimSpec {
    pub specifier: Specifier,
    pub type_name: Option<String>,
    pub name: String,
    pub kind: Option<String>,
    pub display_name: Option<String>,
    pub api_schemas: Vec<String>,
    pub references: Vec<Reference>,
    pub payloads: Vec<Reference>,
    properties: Vec<(String, Property)>,
    children: Vec<PrimSpec>,
}

impl PrimSpec {
    pub fn new(specifier: Specifier, name: impl Into<String>) -> Self {
        Self {
            specifier,
            type_name: None,
            name: name.into(),
            kind: None,
            display_name: None,
            api_schemas: Vec::new(),
            references: Vec::new(),
            payloads: Vec::new(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add an applied API schema once
    pub fn apply_api(&mut self, schema: &str) -> &mut Self {
        if !self.api_schemas.iter().any(|s| s == schema) {
            self.api_schemas.push(schema.to_string());
        }
        self
    }

    pub fn has_api(&self, schema: &str) -> bool {
        self.api_schemas.iter().any(|s| s == schema)
    }

    /// Set a property, replacing an earlier opinion with the same name
    pub fn set_property(&mut self, name: &str, property: Property) -> &mut Self {
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = property,
            None => self.properties.push((name.to_string(), property)),
        }
        self
    }

    pub fn set(&mut self, name: &str, value: Value) -> &mut Self {
        self.set_property(name, Property::Attribute(Attribute::new(value)))
    }

    pub fn set_uniform(&mut self, name: &str, value: Value) -> &mut Self {
        self.set_property(name, Property::Attribute(Attribute::new(value).uniform()))
    }

    pub fn set_custom(&mut self, name: &str, value: Value) -> &mut Self {
        self.set_property(name, Property::Attribute(Attribute::new(value).custom()))
    }

    pub fn set_relationship(&mut self, name: &str, targets: Vec<PrimPath>) -> &mut Self {
        self.set_property(name, Property::Relationship(targets))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Authored value of an attribute
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.property(name)? {
            Property::Attribute(attribute) => attribute.value.as_ref(),
            Property::Relationship(_) => None,
        }
    }

    pub fn relationship(&self, name: &str) -> Option<&[PrimPath]> {
        match self.property(name)? {
            Property::Relationship(targets) => Some(targets),
            Property::Attribute(_) => None,
        }
    }

    pub fn properties(&self) -> &[(String, Property)] {
        &self.properties
    }

    pub fn children(&self) -> &[PrimSpec] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_mut_or_over(&mut self, name: &str) -> &mut PrimSpec {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(PrimSpec::new(Specifier::Over, name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// This spec and all descendants, depth first
    pub fn descendants(&self) -> Vec<&PrimSpec> {
        let mut result = vec![self];
        for child in &self.children {
            result.extend(child.descendants());
        }
        result
    }
}

/// Layer-level metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerMetadata {
    pub default_prim: Option<String>,
    pub up_axis: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub kilograms_per_unit: Option<f64>,
    pub doc: Option<String>,
    pub sublayers: Vec<String>,
    pub custom_data: Vec<(String, String)>,
}

/// A single scene description layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub metadata: LayerMetadata,
    root_prims: Vec<PrimSpec>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_prims(&self) -> &[PrimSpec] {
        &self.root_prims
    }

    /// Spec at `path`, creating it and any missing ancestor as `over`
    pub fn override_prim(&mut self, path: &PrimPath) -> &mut PrimSpec {
        let mut components = path.components();
        // callers never pass the pseudo-root
        let first = components.next().unwrap_or_default();
        let index = match self.root_prims.iter().position(|p| p.name == first) {
            Some(index) => index,
            None => {
                self.root_prims.push(PrimSpec::new(Specifier::Over, first));
                self.root_prims.len() - 1
            }
        };
        let mut spec = &mut self.root_prims[index];
        for component in components {
            spec = spec.child_mut_or_over(component);
        }
        spec
    }

    /// Define a typed prim; missing ancestors become `over`
    pub fn define_prim(&mut self, path: &PrimPath, type_name: &str) -> &mut PrimSpec {
        let spec = self.override_prim(path);
        spec.specifier = Specifier::Def;
        if !type_name.is_empty() {
            spec.type_name = Some(type_name.to_string());
        }
        spec
    }

    pub fn prim(&self, path: &PrimPath) -> Option<&PrimSpec> {
        let mut components = path.components();
        let first = components.next()?;
        let mut spec = self.root_prims.iter().find(|p| p.name == first)?;
        for component in components {
            spec = spec.child(component)?;
        }
        Some(spec)
    }

    pub fn prim_mut(&mut self, path: &PrimPath) -> Option<&mut PrimSpec> {
        let mut components = path.components();
        let first = components.next()?;
        let mut spec = self.root_prims.iter_mut().find(|p| p.name == first)?;
        for component in components {
            spec = spec.children.iter_mut().find(|c| c.name == component)?;
        }
        Some(spec)
    }

    /// Every prim spec in the layer
    pub fn prim_count(&self) -> usize {
        self.root_prims.iter().map(|p| p.descendants().len()).sum()
    }

    pub fn to_usda(&self) -> String {
        UsdaWriter::new().write_layer(self)
    }

    /// Serialize to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), AssetWriteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AssetWriteError::new(parent, e))?;
        }
        std::fs::write(path, self.to_usda()).map_err(|e| AssetWriteError::new(path, e))
    }
}

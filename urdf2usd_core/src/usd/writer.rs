//! USDA text serializer

use std::fmt::Write;

use super::layer::{Attribute, Layer, PrimSpec, Property, Reference};
use super::Value;

/// Builds the `.usda` text of one layer
pub struct UsdaWriter {
    output: String,
    indent: usize,
}

impl Default for UsdaWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl UsdaWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn write_layer(mut self, layer: &Layer) -> String {
        self.write_header(layer);
        for prim in layer.root_prims() {
            self.output.push('\n');
            self.write_prim(prim);
        }
        self.output
    }

    fn write_header(&mut self, layer: &Layer) {
        let metadata = &layer.metadata;
        self.write_line("#usda 1.0");
        self.write_line("(");
        self.indent += 1;

        if !metadata.custom_data.is_empty() {
            self.write_line("customLayerData = {");
            self.indent += 1;
            for (key, value) in &metadata.custom_data {
                let line = format!("string {} = \"{}\"", key, escape_string(value));
                self.write_line(&line);
            }
            self.indent -= 1;
            self.write_line("}");
        }
        if let Some(name) = &metadata.default_prim {
            let line = format!("defaultPrim = \"{}\"", escape_string(name));
            self.write_line(&line);
        }
        if let Some(doc) = &metadata.doc {
            let line = format!("doc = \"{}\"", escape_string(doc));
            self.write_line(&line);
        }
        if let Some(kg) = metadata.kilograms_per_unit {
            let line = format!("kilogramsPerUnit = {}", format_double(kg));
            self.write_line(&line);
        }
        if let Some(mpu) = metadata.meters_per_unit {
            let line = format!("metersPerUnit = {}", format_double(mpu));
            self.write_line(&line);
        }
        if !metadata.sublayers.is_empty() {
            self.write_line("subLayers = [");
            self.indent += 1;
            let count = metadata.sublayers.len();
            for (i, sublayer) in metadata.sublayers.iter().enumerate() {
                let separator = if i + 1 < count { "," } else { "" };
                let line = format!("@{}@{}", sublayer, separator);
                self.write_line(&line);
            }
            self.indent -= 1;
            self.write_line("]");
        }
        if let Some(axis) = &metadata.up_axis {
            let line = format!("upAxis = \"{}\"", axis);
            self.write_line(&line);
        }

        self.indent -= 1;
        self.write_line(")");
    }

    fn write_prim(&mut self, prim: &PrimSpec) {
        let mut head = prim.specifier.keyword().to_string();
        if let Some(type_name) = &prim.type_name {
            head.push(' ');
            head.push_str(type_name);
        }
        let _ = write!(head, " \"{}\"", prim.name);

        let metadata = prim_metadata(prim);
        if metadata.is_empty() {
            self.write_line(&head);
        } else {
            head.push_str(" (");
            self.write_line(&head);
            self.indent += 1;
            for line in &metadata {
                self.write_line(line);
            }
            self.indent -= 1;
            self.write_line(")");
        }

        self.write_line("{");
        self.indent += 1;
        for (name, property) in prim.properties() {
            self.write_property(name, property);
        }
        for (i, child) in prim.children().iter().enumerate() {
            if i > 0 || !prim.properties().is_empty() {
                self.output.push('\n');
            }
            self.write_prim(child);
        }
        self.indent -= 1;
        self.write_line("}");
    }

    fn write_property(&mut self, name: &str, property: &Property) {
        match property {
            Property::Relationship(targets) => {
                let line = match targets.as_slice() {
                    [] => format!("rel {}", name),
                    [single] => format!("rel {} = <{}>", name, single),
                    many => format!(
                        "rel {} = [{}]",
                        name,
                        many.iter()
                            .map(|t| format!("<{}>", t))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                };
                self.write_line(&line);
            }
            Property::Attribute(attribute) => self.write_attribute(name, attribute),
        }
    }

    fn write_attribute(&mut self, name: &str, attribute: &Attribute) {
        let mut line = String::new();
        if attribute.custom {
            line.push_str("custom ");
        }
        if attribute.uniform {
            line.push_str("uniform ");
        }
        let _ = write!(line, "{} {}", attribute.type_name, name);
        if let Some(target) = &attribute.connection {
            let _ = write!(line, ".connect = <{}>", target);
        } else if let Some(value) = &attribute.value {
            let _ = write!(line, " = {}", format_value(value));
        }

        match attribute.interpolation {
            Some(interpolation) => {
                line.push_str(" (");
                self.write_line(&line);
                self.indent += 1;
                let meta = format!("interpolation = \"{}\"", interpolation);
                self.write_line(&meta);
                self.indent -= 1;
                self.write_line(")");
            }
            None => self.write_line(&line),
        }
    }

    fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(line);
        self.output.push('\n');
    }
}

fn prim_metadata(prim: &PrimSpec) -> Vec<String> {
    let mut lines = Vec::new();
    if !prim.api_schemas.is_empty() {
        let schemas: Vec<String> = prim
            .api_schemas
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect();
        lines.push(format!("prepend apiSchemas = [{}]", schemas.join(", ")));
    }
    if let Some(display_name) = &prim.display_name {
        lines.push(format!("displayName = \"{}\"", escape_string(display_name)));
    }
    if let Some(kind) = &prim.kind {
        lines.push(format!("kind = \"{}\"", kind));
    }
    if !prim.payloads.is_empty() {
        lines.push(format!("prepend payload = {}", format_arcs(&prim.payloads)));
    }
    if !prim.references.is_empty() {
        lines.push(format!(
            "prepend references = {}",
            format_arcs(&prim.references)
        ));
    }
    lines
}

fn format_arcs(arcs: &[Reference]) -> String {
    let format_arc = |arc: &Reference| match &arc.prim {
        Some(prim) => format!("@{}@<{}>", arc.asset, prim),
        None => format!("@{}@", arc.asset),
    };
    match arcs {
        [single] => format_arc(single),
        many => format!(
            "[{}]",
            many.iter().map(format_arc).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Format a typed value the way it appears after `=`
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Double(d) => format_double(*d),
        Value::Token(s) | Value::String(s) => format!("\"{}\"", escape_string(s)),
        Value::Asset(path) => format!("@{}@", path),
        Value::Float3(v) | Value::Point3f(v) | Value::Vector3f(v) | Value::Color3f(v) => {
            format_tuple(v.iter().map(|c| format_float(*c)))
        }
        Value::Double3(v) => format_tuple(v.iter().map(|c| format_double(*c))),
        Value::Quatf(q) => format_tuple(q.iter().map(|c| format_float(*c))),
        Value::IntArray(values) => format_array(values.iter().map(|i| i.to_string())),
        Value::TokenArray(tokens) => {
            format_array(tokens.iter().map(|t| format!("\"{}\"", escape_string(t))))
        }
        Value::Float3Array(values) | Value::Point3fArray(values) | Value::Normal3fArray(values) => {
            format_array(
                values
                    .iter()
                    .map(|v| format_tuple(v.iter().map(|c| format_float(*c)))),
            )
        }
        Value::TexCoord2fArray(values) => format_array(
            values
                .iter()
                .map(|v| format_tuple(v.iter().map(|c| format_float(*c)))),
        ),
    }
}

fn format_tuple(items: impl Iterator<Item = String>) -> String {
    format!("({})", items.collect::<Vec<_>>().join(", "))
}

fn format_array(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

/// Format a double for USD output (shortest round-trip form)
pub fn format_double(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if !value.is_finite() {
        format_non_finite(value.is_nan(), value.is_sign_negative())
    } else if value.abs() < 0.0001 || value.abs() >= 1e6 {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

/// Format a float without widening artifacts such as `0.10000000149`
pub fn format_float(value: f32) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if !value.is_finite() {
        format_non_finite(value.is_nan(), value.is_sign_negative())
    } else if value.abs() < 0.0001 || value.abs() >= 1e6 {
        format!("{:e}", value)
    } else {
        format!("{}", value)
    }
}

fn format_non_finite(nan: bool, negative: bool) -> String {
    match (nan, negative) {
        (true, _) => "nan".to_string(),
        (false, true) => "-inf".to_string(),
        (false, false) => "inf".to_string(),
    }
}

/// Escape a string for USD output
pub fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }
    result
}

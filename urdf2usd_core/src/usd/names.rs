//! Prim name sanitizing

use std::collections::{HashMap, HashSet};

use super::PrimPath;

/// Turn an arbitrary name into a valid prim identifier
pub fn sanitize_identifier(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if result.is_empty() {
        return "unnamed".to_string();
    }
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Unique sibling names, tracked per parent prim
#[derive(Debug, Default)]
pub struct NameCache {
    taken: HashMap<PrimPath, HashSet<String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name below `parent`; clashes get `_1`, `_2`, ... suffixes
    pub fn claim(&mut self, parent: &PrimPath, name: &str) -> String {
        let base = sanitize_identifier(name);
        let taken = self.taken.entry(parent.clone()).or_default();
        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        taken.insert(candidate.clone());
        candidate
    }

    /// Reserve a name and return the child path
    pub fn child(&mut self, parent: &PrimPath, name: &str) -> PrimPath {
        let name = self.claim(parent, name);
        parent.child(&name)
    }
}

//! Closed type descriptors for the schema the cache normalizes against.
//!
//! The schema is resolved once when loaded; normalization and reads only ask
//! whether a concrete typename satisfies a type condition.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Description of one named schema type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeDescriptor {
    /// Leaf scalar (`String`, `ID`, custom scalars).
    Scalar { name: String },
    /// Concrete object type and the interfaces it implements.
    Object {
        name: String,
        #[serde(default)]
        interfaces: Vec<String>,
    },
    /// Abstract interface; implementors are derived from object declarations.
    Interface { name: String },
    /// Abstract union over concrete member types.
    Union { name: String, members: Vec<String> },
    /// Enumeration with its allowed values.
    Enum { name: String, values: Vec<String> },
    /// Input object, only meaningful for arguments.
    InputObject { name: String },
}

impl TypeDescriptor {
    /// Returns the type name.
    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Scalar { name }
            | TypeDescriptor::Object { name, .. }
            | TypeDescriptor::Interface { name }
            | TypeDescriptor::Union { name, .. }
            | TypeDescriptor::Enum { name, .. }
            | TypeDescriptor::InputObject { name } => name,
        }
    }

    /// Returns `true` for interfaces and unions.
    pub fn is_abstract(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Interface { .. } | TypeDescriptor::Union { .. }
        )
    }
}

/// Type registry with precomputed possible types for abstract types.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    types: FxHashMap<String, TypeDescriptor>,
    possible_types: FxHashMap<String, FxHashSet<String>>,
}

impl Schema {
    /// Builds a schema from its type descriptors.
    pub fn new(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let types: FxHashMap<String, TypeDescriptor> = types
            .into_iter()
            .map(|ty| (ty.name().to_owned(), ty))
            .collect();
        let mut possible_types: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        for ty in types.values() {
            match ty {
                TypeDescriptor::Object { name, interfaces } => {
                    for iface in interfaces {
                        possible_types
                            .entry(iface.clone())
                            .or_default()
                            .insert(name.clone());
                    }
                }
                TypeDescriptor::Union { name, members } => {
                    possible_types
                        .entry(name.clone())
                        .or_default()
                        .extend(members.iter().cloned());
                }
                _ => {}
            }
        }
        Self {
            types,
            possible_types,
        }
    }

    /// Parses a JSON array of type descriptors.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let types: Vec<TypeDescriptor> = serde_json::from_str(json)?;
        Ok(Self::new(types))
    }

    /// Looks up a type by name.
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` when no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns whether a record of `typename` satisfies `condition`.
    pub fn satisfies(&self, typename: &str, condition: &str) -> bool {
        if typename == condition {
            return true;
        }
        self.possible_types
            .get(condition)
            .is_some_and(|members| members.contains(typename))
    }
}

/// Type-condition check used by the normalizer and reader.
///
/// Unknown typenames apply the condition; without a schema only exact
/// matches apply.
pub(crate) fn type_condition_applies(
    schema: Option<&Schema>,
    typename: Option<&str>,
    condition: &str,
) -> bool {
    let Some(typename) = typename else {
        return true;
    };
    match schema {
        Some(schema) => schema.satisfies(typename, condition),
        None => typename == condition,
    }
}

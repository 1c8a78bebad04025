use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Selection;
use crate::types::{DataId, Variables};

/// Kind of root operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

/// What the network layer needs to issue a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestParameters {
    /// Operation name, used in diagnostics.
    pub name: String,
    #[serde(default)]
    pub operation_kind: OperationKind,
    /// Persisted query id, when the server knows the document.
    #[serde(default)]
    pub id: Option<String>,
    /// Document text, when not persisted.
    #[serde(default)]
    pub text: Option<String>,
}

/// Declared operation variable with its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default)]
    pub default_value: Value,
}

/// Root operation: request parameters plus its selection tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub params: RequestParameters,
    #[serde(default)]
    pub variable_definitions: Vec<VariableDefinition>,
    pub selections: Arc<[Selection]>,
}

impl Operation {
    /// Builds a query with the given name and selections.
    pub fn query(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            params: RequestParameters {
                name: name.into(),
                operation_kind: OperationKind::Query,
                id: None,
                text: None,
            },
            variable_definitions: Vec::new(),
            selections: selections.into(),
        }
    }

    /// Declares a variable with an optional default.
    pub fn variable(mut self, name: impl Into<String>, default_value: Value) -> Self {
        self.variable_definitions.push(VariableDefinition {
            name: name.into(),
            default_value,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }
}

/// Named selection set on a type, read from an arbitrary record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    pub type_condition: String,
    pub selections: Arc<[Selection]>,
}

impl Fragment {
    pub fn new(
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selections: Vec<Selection>,
    ) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            selections: selections.into(),
        }
    }
}

/// Read/write key of a view: root record, selections and variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    pub data_id: DataId,
    pub selections: Arc<[Selection]>,
    pub variables: Variables,
}

impl Selector {
    pub fn new(data_id: DataId, selections: Arc<[Selection]>, variables: Variables) -> Self {
        Self {
            data_id,
            selections,
            variables,
        }
    }

    /// Selector reading `fragment` from the record `data_id`.
    pub fn for_fragment(data_id: impl Into<DataId>, fragment: &Fragment, variables: Variables) -> Self {
        Self::new(data_id.into(), fragment.selections.clone(), variables)
    }
}

/// An operation bound to concrete variables.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationDescriptor {
    pub request: Arc<Operation>,
    pub variables: Variables,
    /// Selector over the root record with the operation's selections.
    pub root: Selector,
}

impl OperationDescriptor {
    /// Binds an operation to variables.
    ///
    /// Only declared variables are kept; undeclared ones are dropped and
    /// missing ones take their declared default.
    pub fn new(request: Arc<Operation>, variables: Variables) -> Self {
        let mut bound = Variables::new();
        for def in &request.variable_definitions {
            let value = variables
                .get(&def.name)
                .cloned()
                .unwrap_or_else(|| def.default_value.clone());
            bound.insert(def.name.clone(), value);
        }
        let root = Selector::new(DataId::root(), request.selections.clone(), bound.clone());
        Self {
            request,
            variables: bound,
            root,
        }
    }

    pub fn name(&self) -> &str {
        self.request.name()
    }

    /// Stable identity of the operation and its variables, used for retains.
    pub fn identifier(&self) -> String {
        let vars = serde_json::to_string(&self.variables).unwrap_or_default();
        format!("{}{}", self.request.name(), vars)
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

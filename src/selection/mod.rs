//! Pre-resolved selection trees, as produced by an external compiler.
//!
//! Nodes are plain data: the normalizer, reader and garbage collector walk the
//! same tree, each interpreting the nodes it cares about.

mod operation;
mod storage_key;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Variables;

pub use operation::{
    Fragment, Operation, OperationDescriptor, OperationKind, RequestParameters, Selector,
    VariableDefinition,
};
pub use storage_key::{format_storage_key, handle_storage_key, storage_key};

/// Argument expression attached to a field or directive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArgumentValue {
    /// Constant value.
    Literal { value: Value },
    /// Reference to an operation variable.
    Variable { name: String },
    /// List whose items may themselves reference variables.
    List { items: Vec<ArgumentValue> },
    /// Input object whose fields may reference variables.
    Object { fields: Vec<Argument> },
}

impl ArgumentValue {
    /// Builds a literal argument.
    pub fn literal(value: impl Into<Value>) -> Self {
        ArgumentValue::Literal {
            value: value.into(),
        }
    }

    /// Builds a variable reference.
    pub fn variable(name: impl Into<String>) -> Self {
        ArgumentValue::Variable { name: name.into() }
    }

    /// Substitutes variables; an unbound variable resolves to `null`.
    pub fn resolve(&self, variables: &Variables) -> Value {
        match self {
            ArgumentValue::Literal { value } => value.clone(),
            ArgumentValue::Variable { name } => variables.get(name).cloned().unwrap_or(Value::Null),
            ArgumentValue::List { items } => {
                Value::Array(items.iter().map(|item| item.resolve(variables)).collect())
            }
            ArgumentValue::Object { fields } => Value::Object(
                fields
                    .iter()
                    .map(|arg| (arg.name.clone(), arg.value.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

/// Named argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Argument expression.
    pub value: ArgumentValue,
}

/// Handle bound to a field: a post-normalization hook deriving a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldHandle {
    /// Name used to look the handler up.
    pub handle: String,
    /// Optional key distinguishing several handles on one field.
    #[serde(default)]
    pub key: Option<String>,
    /// Arguments that participate in the handle storage key.
    #[serde(default)]
    pub filters: Option<Vec<String>>,
}

/// Leaf field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarField {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub handle: Option<FieldHandle>,
}

impl ScalarField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            args: Vec::new(),
            handle: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.args.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(FieldHandle {
            handle: handle.into(),
            key: None,
            filters: None,
        });
        self
    }

    /// Key under which the field appears in responses and snapshots.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Storage key of the raw server value.
    pub fn storage_key(&self, variables: &Variables) -> String {
        storage_key(&self.name, &self.args, variables)
    }

    /// Storage key read by the reader: the handle key when a handle is bound.
    pub fn read_key(&self, variables: &Variables) -> String {
        match &self.handle {
            Some(handle) => handle_storage_key(handle, &self.name, &self.args, variables),
            None => self.storage_key(variables),
        }
    }
}

/// Field pointing at one record or a list of records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkedField {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub args: Vec<Argument>,
    #[serde(default)]
    pub plural: bool,
    /// Typename to assume when the response omits `__typename`.
    #[serde(default)]
    pub concrete_type: Option<String>,
    #[serde(default)]
    pub handle: Option<FieldHandle>,
    pub selections: Vec<Selection>,
}

impl LinkedField {
    pub fn new(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            args: Vec::new(),
            plural: false,
            concrete_type: None,
            handle: None,
            selections,
        }
    }

    pub fn plural(mut self) -> Self {
        self.plural = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.args.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    pub fn concrete_type(mut self, typename: impl Into<String>) -> Self {
        self.concrete_type = Some(typename.into());
        self
    }

    pub fn handle(mut self, handle: FieldHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn storage_key(&self, variables: &Variables) -> String {
        storage_key(&self.name, &self.args, variables)
    }

    pub fn read_key(&self, variables: &Variables) -> String {
        match &self.handle {
            Some(handle) => handle_storage_key(handle, &self.name, &self.args, variables),
            None => self.storage_key(variables),
        }
    }
}

/// Selections applied when the record's type satisfies `type_condition`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InlineFragment {
    pub type_condition: String,
    pub selections: Vec<Selection>,
}

/// Reference to a named fragment, inlined at this position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpread {
    pub fragment: Arc<Fragment>,
}

/// Selections included only when a boolean variable equals `passing_value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub condition: String,
    pub passing_value: bool,
    pub selections: Vec<Selection>,
}

/// Subtree the server may deliver after the primary payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Defer {
    pub label: String,
    /// Guard; `None` means always deferred.
    #[serde(default, rename = "if")]
    pub if_condition: Option<ArgumentValue>,
    pub selections: Vec<Selection>,
}

/// Plural linked field whose items may arrive one payload at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub label: String,
    #[serde(default, rename = "if")]
    pub if_condition: Option<ArgumentValue>,
    pub field: LinkedField,
}

/// One node of a selection tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Selection {
    ScalarField(ScalarField),
    LinkedField(LinkedField),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
    Condition(Condition),
    Defer(Defer),
    Stream(Stream),
}

impl Selection {
    /// Scalar field without arguments.
    pub fn scalar(name: impl Into<String>) -> Self {
        Selection::ScalarField(ScalarField::new(name))
    }

    /// Singular linked field without arguments.
    pub fn linked(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::LinkedField(LinkedField::new(name, selections))
    }

    pub fn inline_fragment(type_condition: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::InlineFragment(InlineFragment {
            type_condition: type_condition.into(),
            selections,
        })
    }

    pub fn spread(fragment: Arc<Fragment>) -> Self {
        Selection::FragmentSpread(FragmentSpread { fragment })
    }

    pub fn condition(
        variable: impl Into<String>,
        passing_value: bool,
        selections: Vec<Selection>,
    ) -> Self {
        Selection::Condition(Condition {
            condition: variable.into(),
            passing_value,
            selections,
        })
    }

    pub fn defer(
        label: impl Into<String>,
        if_condition: Option<ArgumentValue>,
        selections: Vec<Selection>,
    ) -> Self {
        Selection::Defer(Defer {
            label: label.into(),
            if_condition,
            selections,
        })
    }

    pub fn stream(
        label: impl Into<String>,
        if_condition: Option<ArgumentValue>,
        field: LinkedField,
    ) -> Self {
        Selection::Stream(Stream {
            label: label.into(),
            if_condition,
            field: field.plural(),
        })
    }
}

impl From<ScalarField> for Selection {
    fn from(field: ScalarField) -> Self {
        Selection::ScalarField(field)
    }
}

impl From<LinkedField> for Selection {
    fn from(field: LinkedField) -> Self {
        Selection::LinkedField(field)
    }
}

/// Evaluates a `Condition` node against the bound variables.
pub(crate) fn condition_passes(condition: &Condition, variables: &Variables) -> bool {
    let value = variables
        .get(&condition.condition)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    value == condition.passing_value
}

/// Evaluates an `if` guard on a defer/stream node; a missing guard is `true`.
pub(crate) fn guard_enabled(guard: Option<&ArgumentValue>, variables: &Variables) -> bool {
    match guard {
        None => true,
        Some(arg) => !matches!(arg.resolve(variables), Value::Bool(false) | Value::Null),
    }
}

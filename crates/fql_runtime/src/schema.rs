//! Schema types for fields and arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A built-in scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Id,
    String,
    Int,
    Float,
    Bool,
    /// A calendar date, `Y-m-d`.
    Date,
    /// A point in time, stored as unix seconds.
    Time,
    Url,
    /// Any value, never cast.
    Mixed,
    /// A JSON object.
    Object,
}

impl ScalarType {
    /// Returns the lowercase name used in messages and schema output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Time => "time",
            Self::Url => "url",
            Self::Mixed => "mixed",
            Self::Object => "object",
        }
    }
}

/// The type of a field or argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeRef {
    Scalar(ScalarType),
    /// The ID of an object resolved by another class.
    Relational(String),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn scalar(ty: ScalarType) -> Self {
        Self::Scalar(ty)
    }

    pub fn relational(class: impl Into<String>) -> Self {
        Self::Relational(class.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Returns the target class if this is a relational type, or a list of
    /// one.
    #[must_use]
    pub fn target_class(&self) -> Option<&str> {
        match self {
            Self::Scalar(_) => None,
            Self::Relational(class) => Some(class),
            Self::List(inner) => inner.target_class(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(ty) => f.write_str(ty.as_str()),
            Self::Relational(class) => f.write_str(class),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A declared argument of a field or directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgDefinition {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ArgDefinition {
    /// Creates an optional argument.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            description: None,
            mandatory: false,
            default: None,
        }
    }

    /// Marks the argument as mandatory.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the value used when the argument is not provided.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub args: Vec<ArgDefinition>,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

impl FieldDefinition {
    /// Creates a field without arguments.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            args: Vec::new(),
            description: None,
            deprecation: None,
        }
    }

    /// Adds an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: ArgDefinition) -> Self {
        self.args.push(arg);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the field as deprecated.
    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }

    /// Returns true if this field answers to `name`, ignoring case.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

//! Error types for JSON Light reading and writing.
//!
//! Every failure surfaced by this crate is an [`Error`]. There is no secondary
//! error-code layer: each variant carries the substitution arguments of its
//! message, and [`Error::message_key`] returns a stable key for the message
//! template so callers can localize or match on it.
//!
//! ## Error Categories
//!
//! - **Wire-shape errors**: malformed JSON, an unexpected top-level property, a
//!   missing or non-array `value` property
//! - **Type conflicts**: a wire type annotation incompatible with the declared
//!   type, `null` for a non-nullable element, a number out of range
//! - **Metadata-consistency errors** (writing): duplicate operation targets, a
//!   collection whose type name cannot be determined, an entity reference link
//!   without a URL
//! - **State errors**: calling a reader or writer method in the wrong state, or
//!   after a previous failure
//!
//! ## Examples
//!
//! ```rust
//! use odata_json_light::Error;
//!
//! let err = Error::type_conflict("Birthday", "Edm.DateTimeOffset", "Edm.String");
//! assert_eq!(err.message_key(), "type_conflict");
//! assert!(err.to_string().contains("Birthday"));
//! ```

use std::fmt;
use thiserror::Error;

/// Represents all possible errors that can occur while reading or writing a payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// I/O error while filling the input buffer or draining the output buffer
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed JSON, reported by the lexer
    #[error("Syntax error at line {line}, column {col}: {msg}")]
    Syntax { line: usize, col: usize, msg: String },

    /// The payload ended while more content was required
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEndOfInput { expected: String },

    /// A payload did not start with the node its kind requires
    #[error("Invalid content start: expected {expected}, found {found}")]
    InvalidContentStart { expected: String, found: String },

    /// A top-level collection or property payload carried a property other than `value`
    #[error("Unexpected top-level property '{0}'")]
    UnexpectedTopLevelProperty(String),

    /// A top-level collection or property payload had no `value` property
    #[error("The required 'value' property is missing from the payload")]
    MissingValueProperty,

    /// A reserved annotation appeared where it is not allowed
    #[error("Unexpected annotation property '{0}'")]
    UnexpectedAnnotation(String),

    /// The same property name appeared twice in one object
    #[error("Duplicate property '{0}'")]
    DuplicateProperty(String),

    /// Property annotations were read but their property never followed
    #[error("Annotations were found for property '{0}' but the property itself is missing")]
    PropertyAnnotationWithoutProperty(String),

    /// A property not declared by a closed type, under the fail policy
    #[error("Property '{property}' is not declared on type '{type_name}'")]
    UndeclaredProperty { property: String, type_name: String },

    /// A wire type annotation is incompatible with the declared type
    #[error("Type conflict on '{property}': declared type '{declared}' is incompatible with annotated type '{annotated}'")]
    TypeConflict {
        property: String,
        declared: String,
        annotated: String,
    },

    /// A type name did not resolve against the model
    #[error("Type '{0}' is not defined in the model")]
    UnknownType(String),

    /// A wire value cannot be converted to its target primitive type
    #[error("Cannot convert '{value}' to '{type_name}'")]
    InvalidPrimitiveValue { type_name: String, value: String },

    /// `null` was read or written where the type does not allow it
    #[error("A null value was found for '{0}', which is not nullable")]
    NullValueForNonNullable(String),

    /// A collection's type name could not be determined by any means
    #[error("No type name could be determined for the collection in '{0}'")]
    MissingTypeName(String),

    /// Two operations in one group advertise the same target
    #[error("Operation '{metadata}' has more than one entry with target '{target}'")]
    DuplicateOperationTarget { metadata: String, target: String },

    /// An operation in a group of several has no target
    #[error("Operation '{0}' is advertised more than once but one occurrence has no target")]
    OperationWithoutTarget(String),

    /// An entity reference link was written without a URL
    #[error("An entity reference link must have a URL")]
    MissingEntityReferenceUrl,

    /// A collection mixes primitive, enum and structured items
    #[error("Collection '{0}' mixes items of different kinds")]
    MixedCollection(String),

    /// A reader or writer method was called in the wrong state
    #[error("Cannot {operation} in state {state}")]
    InvalidState { operation: String, state: String },

    /// Nested scopes exceeded the configured depth limit
    #[error("Maximum nesting depth of {0} exceeded")]
    MaxDepthExceeded(usize),

    /// A delta element could not be classified or had an invalid shape
    #[error("Invalid delta item: {0}")]
    InvalidDeltaItem(String),

    /// Custom error
    #[error("Error: {0}")]
    Custom(String),
}

impl Error {
    /// Returns the stable key identifying this error's message template.
    #[must_use]
    pub fn message_key(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Syntax { .. } => "syntax",
            Error::UnexpectedEndOfInput { .. } => "unexpected_end_of_input",
            Error::InvalidContentStart { .. } => "invalid_content_start",
            Error::UnexpectedTopLevelProperty(_) => "unexpected_top_level_property",
            Error::MissingValueProperty => "missing_value_property",
            Error::UnexpectedAnnotation(_) => "unexpected_annotation_property",
            Error::DuplicateProperty(_) => "duplicate_property",
            Error::PropertyAnnotationWithoutProperty(_) => "property_annotation_without_property",
            Error::UndeclaredProperty { .. } => "undeclared_property",
            Error::TypeConflict { .. } => "type_conflict",
            Error::UnknownType(_) => "unknown_type",
            Error::InvalidPrimitiveValue { .. } => "invalid_primitive_value",
            Error::NullValueForNonNullable(_) => "null_value_for_non_nullable",
            Error::MissingTypeName(_) => "missing_type_name",
            Error::DuplicateOperationTarget { .. } => "duplicate_operation_target",
            Error::OperationWithoutTarget(_) => "operation_without_target",
            Error::MissingEntityReferenceUrl => "missing_entity_reference_url",
            Error::MixedCollection(_) => "mixed_collection",
            Error::InvalidState { .. } => "invalid_state",
            Error::MaxDepthExceeded(_) => "max_depth_exceeded",
            Error::InvalidDeltaItem(_) => "invalid_delta_item",
            Error::Custom(_) => "custom",
        }
    }

    /// Creates a syntax error with line and column information.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::Error;
    ///
    /// let err = Error::syntax(10, 5, "unexpected token");
    /// assert!(err.to_string().contains("line 10"));
    /// ```
    pub fn syntax(line: usize, col: usize, msg: &str) -> Self {
        Error::Syntax {
            line,
            col,
            msg: msg.to_string(),
        }
    }

    pub fn unexpected_eof(expected: &str) -> Self {
        Error::UnexpectedEndOfInput {
            expected: expected.to_string(),
        }
    }

    /// Creates a content-start error for a payload whose first node is wrong.
    pub fn invalid_content_start(expected: &str, found: impl fmt::Display) -> Self {
        Error::InvalidContentStart {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn undeclared_property(property: &str, type_name: &str) -> Self {
        Error::UndeclaredProperty {
            property: property.to_string(),
            type_name: type_name.to_string(),
        }
    }

    /// Creates a type conflict between a declared and an annotated type.
    pub fn type_conflict(property: &str, declared: &str, annotated: &str) -> Self {
        Error::TypeConflict {
            property: property.to_string(),
            declared: declared.to_string(),
            annotated: annotated.to_string(),
        }
    }

    pub fn invalid_primitive(type_name: &str, value: impl fmt::Display) -> Self {
        Error::InvalidPrimitiveValue {
            type_name: type_name.to_string(),
            value: value.to_string(),
        }
    }

    /// Creates a state error naming the rejected operation and the current state.
    pub fn invalid_state(operation: &str, state: impl fmt::Debug) -> Self {
        Error::InvalidState {
            operation: operation.to_string(),
            state: format!("{:?}", state),
        }
    }

    /// Creates a custom error with a display message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::Error;
    ///
    /// let err = Error::custom("something went wrong");
    /// assert!(err.to_string().contains("something went wrong"));
    /// ```
    pub fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }

    pub fn io(msg: &str) -> Self {
        Error::Io(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Io => Error::Io(err.to_string()),
            Category::Eof => Error::unexpected_eof("the rest of the payload"),
            Category::Syntax | Category::Data => {
                // serde_json appends the position to its message; it is kept in the fields instead.
                let text = err.to_string();
                let msg = text.split(" at line ").next().unwrap_or_default();
                Error::syntax(err.line(), err.column(), msg)
            }
        }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Query interface onto the entity data model.
//!
//! Readers and writers only ever ask the model questions: which properties a
//! structured type declares, whether it is open, what it derives from, which
//! operations are bound to it. [`EdmModel`] is that question surface. Any
//! schema implementation can sit behind it; [`Model`] is a small immutable
//! in-memory implementation assembled with [`ModelBuilder`].
//!
//! Models are read-only once built and are shared between contexts as
//! `Arc<dyn EdmModel>`.
//!
//! ## Examples
//!
//! ```rust
//! use odata_json_light::edm::{EdmModel, EdmTypeRef, ModelBuilder, PrimitiveKind, StructuredType};
//!
//! let model = ModelBuilder::new()
//!     .structured_type(
//!         StructuredType::entity("NS.Customer")
//!             .key("Id")
//!             .property("Id", EdmTypeRef::primitive(PrimitiveKind::Int32).not_null())
//!             .property("Name", EdmTypeRef::primitive(PrimitiveKind::String)),
//!     )
//!     .entity_set("Customers", "NS.Customer")
//!     .build();
//!
//! assert!(model.find_property("NS.Customer", "Name").is_some());
//! assert_eq!(model.find_entity_set("Customers").unwrap().entity_type, "NS.Customer");
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

pub const COLLECTION_PREFIX: &str = "Collection(";

/// The primitive kinds of the EDM type system this crate reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Binary,
    Boolean,
    Byte,
    Date,
    DateTimeOffset,
    Decimal,
    Double,
    Duration,
    Guid,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    Stream,
    String,
    TimeOfDay,
    /// Abstract `Edm.PrimitiveType`; every concrete kind derives from it.
    PrimitiveType,
}

const ALL_KINDS: [PrimitiveKind; 18] = [
    PrimitiveKind::Binary,
    PrimitiveKind::Boolean,
    PrimitiveKind::Byte,
    PrimitiveKind::Date,
    PrimitiveKind::DateTimeOffset,
    PrimitiveKind::Decimal,
    PrimitiveKind::Double,
    PrimitiveKind::Duration,
    PrimitiveKind::Guid,
    PrimitiveKind::Int16,
    PrimitiveKind::Int32,
    PrimitiveKind::Int64,
    PrimitiveKind::SByte,
    PrimitiveKind::Single,
    PrimitiveKind::Stream,
    PrimitiveKind::String,
    PrimitiveKind::TimeOfDay,
    PrimitiveKind::PrimitiveType,
];

impl PrimitiveKind {
    /// Returns the qualified name, e.g. `Edm.Int32`.
    #[must_use]
    pub const fn full_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Binary => "Edm.Binary",
            PrimitiveKind::Boolean => "Edm.Boolean",
            PrimitiveKind::Byte => "Edm.Byte",
            PrimitiveKind::Date => "Edm.Date",
            PrimitiveKind::DateTimeOffset => "Edm.DateTimeOffset",
            PrimitiveKind::Decimal => "Edm.Decimal",
            PrimitiveKind::Double => "Edm.Double",
            PrimitiveKind::Duration => "Edm.Duration",
            PrimitiveKind::Guid => "Edm.Guid",
            PrimitiveKind::Int16 => "Edm.Int16",
            PrimitiveKind::Int32 => "Edm.Int32",
            PrimitiveKind::Int64 => "Edm.Int64",
            PrimitiveKind::SByte => "Edm.SByte",
            PrimitiveKind::Single => "Edm.Single",
            PrimitiveKind::Stream => "Edm.Stream",
            PrimitiveKind::String => "Edm.String",
            PrimitiveKind::TimeOfDay => "Edm.TimeOfDay",
            PrimitiveKind::PrimitiveType => "Edm.PrimitiveType",
        }
    }

    /// Resolves `Edm.Int32` or the short wire form `Int32`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::edm::PrimitiveKind;
    ///
    /// assert_eq!(PrimitiveKind::from_name("Edm.Int16"), Some(PrimitiveKind::Int16));
    /// assert_eq!(PrimitiveKind::from_name("Double"), Some(PrimitiveKind::Double));
    /// assert_eq!(PrimitiveKind::from_name("NS.Address"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        let short = name.strip_prefix("Edm.").unwrap_or(name);
        ALL_KINDS
            .iter()
            .copied()
            .find(|kind| &kind.full_name()[4..] == short)
    }

    /// Kinds whose values JSON represents unambiguously without a type annotation.
    ///
    /// Double is included; its non-finite values are handled by the caller since
    /// they travel as strings.
    #[must_use]
    pub const fn is_json_native(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Boolean
                | PrimitiveKind::Int32
                | PrimitiveKind::String
                | PrimitiveKind::Double
        )
    }

    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        matches!(self, PrimitiveKind::PrimitiveType)
    }

    /// Returns `true` if a value of this kind may be stored where `target` is declared.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use odata_json_light::edm::PrimitiveKind;
    ///
    /// assert!(PrimitiveKind::Int16.can_convert_to(PrimitiveKind::Int64));
    /// assert!(PrimitiveKind::Single.can_convert_to(PrimitiveKind::Double));
    /// assert!(!PrimitiveKind::String.can_convert_to(PrimitiveKind::DateTimeOffset));
    /// ```
    #[must_use]
    pub fn can_convert_to(self, target: PrimitiveKind) -> bool {
        use PrimitiveKind::*;
        if self == target || target == PrimitiveType {
            return true;
        }
        match self {
            Byte => matches!(target, Int16 | Int32 | Int64 | Single | Double | Decimal),
            SByte => matches!(target, Int16 | Int32 | Int64 | Single | Double | Decimal),
            Int16 => matches!(target, Int32 | Int64 | Single | Double | Decimal),
            Int32 => matches!(target, Int64 | Single | Double | Decimal),
            Int64 => matches!(target, Single | Double | Decimal),
            Single => matches!(target, Double),
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// The definition a type reference points at.
#[derive(Clone, Debug, PartialEq)]
pub enum EdmType {
    Primitive(PrimitiveKind),
    Enum(String),
    Complex(String),
    Entity(String),
    Collection(Box<EdmTypeRef>),
    Untyped,
}

/// A reference to a type, with nullability.
#[derive(Clone, Debug, PartialEq)]
pub struct EdmTypeRef {
    pub definition: EdmType,
    pub nullable: bool,
}

impl EdmTypeRef {
    pub fn new(definition: EdmType) -> Self {
        EdmTypeRef {
            definition,
            nullable: true,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(EdmType::Primitive(kind))
    }

    pub fn enumeration(name: &str) -> Self {
        Self::new(EdmType::Enum(name.to_string()))
    }

    pub fn complex(name: &str) -> Self {
        Self::new(EdmType::Complex(name.to_string()))
    }

    pub fn entity(name: &str) -> Self {
        Self::new(EdmType::Entity(name.to_string()))
    }

    pub fn collection(item: EdmTypeRef) -> Self {
        EdmTypeRef {
            definition: EdmType::Collection(Box::new(item)),
            nullable: false,
        }
    }

    pub fn untyped() -> Self {
        Self::new(EdmType::Untyped)
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Returns the qualified name, e.g. `Collection(Edm.String)`.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.definition {
            EdmType::Primitive(kind) => kind.full_name().to_string(),
            EdmType::Enum(name) | EdmType::Complex(name) | EdmType::Entity(name) => name.clone(),
            EdmType::Collection(item) => format!("{}{})", COLLECTION_PREFIX, item.full_name()),
            EdmType::Untyped => "Edm.Untyped".to_string(),
        }
    }

    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self.definition {
            EdmType::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn collection_item(&self) -> Option<&EdmTypeRef> {
        match &self.definition {
            EdmType::Collection(item) => Some(item),
            _ => None,
        }
    }

    /// Name of the structured type this reference points at, if any.
    #[must_use]
    pub fn structured_name(&self) -> Option<&str> {
        match &self.definition {
            EdmType::Complex(name) | EdmType::Entity(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.structured_name().is_some()
    }

    #[must_use]
    pub fn is_untyped(&self) -> bool {
        matches!(self.definition, EdmType::Untyped)
    }
}

/// Splits `Collection(X)` into `X`.
#[must_use]
pub fn collection_item_name(name: &str) -> Option<&str> {
    name.strip_prefix(COLLECTION_PREFIX)?.strip_suffix(')')
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuredKind {
    Entity,
    Complex,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyKind {
    Structural(EdmTypeRef),
    Navigation { target: String, collection: bool },
}

/// A declared property of a structured type.
#[derive(Clone, Debug, PartialEq)]
pub struct EdmProperty {
    pub name: String,
    pub kind: PropertyKind,
}

impl EdmProperty {
    #[must_use]
    pub fn type_ref(&self) -> Option<&EdmTypeRef> {
        match &self.kind {
            PropertyKind::Structural(type_ref) => Some(type_ref),
            PropertyKind::Navigation { .. } => None,
        }
    }

    #[must_use]
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }
}

/// An entity or complex type declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredType {
    pub name: String,
    pub kind: StructuredKind,
    pub base_type: Option<String>,
    pub is_open: bool,
    pub has_stream: bool,
    pub key: Vec<String>,
    pub properties: Vec<EdmProperty>,
}

impl StructuredType {
    pub fn entity(name: &str) -> Self {
        Self::with_kind(name, StructuredKind::Entity)
    }

    pub fn complex(name: &str) -> Self {
        Self::with_kind(name, StructuredKind::Complex)
    }

    fn with_kind(name: &str, kind: StructuredKind) -> Self {
        StructuredType {
            name: name.to_string(),
            kind,
            base_type: None,
            is_open: false,
            has_stream: false,
            key: Vec::new(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn base(mut self, base_type: &str) -> Self {
        self.base_type = Some(base_type.to_string());
        self
    }

    #[must_use]
    pub fn open(mut self) -> Self {
        self.is_open = true;
        self
    }

    /// Marks an entity type as a media entity.
    #[must_use]
    pub fn media(mut self) -> Self {
        self.has_stream = true;
        self
    }

    #[must_use]
    pub fn key(mut self, name: &str) -> Self {
        self.key.push(name.to_string());
        self
    }

    #[must_use]
    pub fn property(mut self, name: &str, type_ref: EdmTypeRef) -> Self {
        self.properties.push(EdmProperty {
            name: name.to_string(),
            kind: PropertyKind::Structural(type_ref),
        });
        self
    }

    #[must_use]
    pub fn navigation(mut self, name: &str, target: &str, collection: bool) -> Self {
        self.properties.push(EdmProperty {
            name: name.to_string(),
            kind: PropertyKind::Navigation {
                target: target.to_string(),
                collection,
            },
        });
        self
    }

    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.kind == StructuredKind::Entity
    }

    /// A reference to this type.
    #[must_use]
    pub fn type_ref(&self) -> EdmTypeRef {
        match self.kind {
            StructuredKind::Entity => EdmTypeRef::entity(&self.name),
            StructuredKind::Complex => EdmTypeRef::complex(&self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<(String, i64)>,
    pub is_flags: bool,
}

impl EnumType {
    pub fn new(name: &str, members: &[&str]) -> Self {
        EnumType {
            name: name.to_string(),
            members: members
                .iter()
                .enumerate()
                .map(|(i, m)| (m.to_string(), i as i64))
                .collect(),
            is_flags: false,
        }
    }

    #[must_use]
    pub fn flags(mut self) -> Self {
        self.is_flags = true;
        self
    }

    /// Returns `true` if `value` names a member, or a comma separated member list for flags.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        let known = |m: &str| self.members.iter().any(|(name, _)| name == m.trim());
        if self.is_flags {
            value.split(',').all(known)
        } else {
            known(value)
        }
    }
}

/// A vocabulary term used by instance annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct Term {
    pub name: String,
    pub type_ref: EdmTypeRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Action,
    Function,
}

/// An action or function bound to a structured type.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundOperation {
    pub name: String,
    pub kind: OperationKind,
    pub binding_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
}

/// Read-only query surface over a schema.
///
/// Implementations must be safe to share across threads; contexts hold them as
/// `Arc<dyn EdmModel>`.
pub trait EdmModel: Send + Sync {
    fn find_structured_type(&self, name: &str) -> Option<&StructuredType>;

    fn find_enum_type(&self, name: &str) -> Option<&EnumType>;

    fn find_term(&self, name: &str) -> Option<&Term>;

    fn find_entity_set(&self, name: &str) -> Option<&EntitySet>;

    /// Operations whose binding parameter is `binding_type` exactly.
    fn operations_bound_to(&self, binding_type: &str) -> Vec<&BoundOperation>;

    fn find_operation(&self, name: &str) -> Option<&BoundOperation>;

    /// Returns `true` if `derived` is `base` or inherits from it.
    fn is_derived_from(&self, derived: &str, base: &str) -> bool {
        let mut current = Some(derived);
        let mut hops = 0;
        while let Some(name) = current {
            if name == base {
                return true;
            }
            hops += 1;
            if hops > 64 {
                return false;
            }
            current = self
                .find_structured_type(name)
                .and_then(|t| t.base_type.as_deref());
        }
        false
    }

    /// Looks a property up on a type and its base types.
    fn find_property(&self, type_name: &str, property: &str) -> Option<&EdmProperty> {
        let mut current = self.find_structured_type(type_name);
        while let Some(ty) = current {
            if let Some(p) = ty.properties.iter().find(|p| p.name == property) {
                return Some(p);
            }
            current = ty
                .base_type
                .as_deref()
                .and_then(|b| self.find_structured_type(b));
        }
        None
    }

    /// Declared properties of a type, base type properties first.
    fn properties_of(&self, type_name: &str) -> Vec<&EdmProperty> {
        let mut chain = Vec::new();
        let mut current = self.find_structured_type(type_name);
        while let Some(ty) = current {
            chain.push(ty);
            current = ty
                .base_type
                .as_deref()
                .and_then(|b| self.find_structured_type(b));
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|ty| ty.properties.iter())
            .collect()
    }

    /// Key property names, inherited from the root entity type.
    fn key_of(&self, type_name: &str) -> Vec<String> {
        let mut current = self.find_structured_type(type_name);
        while let Some(ty) = current {
            if !ty.key.is_empty() {
                return ty.key.clone();
            }
            current = ty
                .base_type
                .as_deref()
                .and_then(|b| self.find_structured_type(b));
        }
        Vec::new()
    }

    fn is_open(&self, type_name: &str) -> bool {
        self.find_structured_type(type_name)
            .map(|t| t.is_open)
            .unwrap_or(false)
    }

    /// Resolves a qualified name (primitive, enum, structured or `Collection(...)`).
    fn resolve_type(&self, name: &str) -> Option<EdmTypeRef> {
        if let Some(item) = collection_item_name(name) {
            return self.resolve_type(item).map(EdmTypeRef::collection);
        }
        if name == "Edm.Untyped" || name == "Untyped" {
            return Some(EdmTypeRef::untyped());
        }
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Some(EdmTypeRef::primitive(kind));
        }
        if self.find_enum_type(name).is_some() {
            return Some(EdmTypeRef::enumeration(name));
        }
        self.find_structured_type(name).map(StructuredType::type_ref)
    }

    /// Bound operations applicable to a type, including those bound to its base types.
    fn operations_for(&self, type_name: &str) -> Vec<&BoundOperation> {
        let mut ops = Vec::new();
        let mut current = self.find_structured_type(type_name);
        while let Some(ty) = current {
            ops.extend(self.operations_bound_to(&ty.name));
            current = ty
                .base_type
                .as_deref()
                .and_then(|b| self.find_structured_type(b));
        }
        ops
    }
}

/// Immutable in-memory model.
#[derive(Clone, Debug, Default)]
pub struct Model {
    structured: IndexMap<String, StructuredType>,
    enums: IndexMap<String, EnumType>,
    terms: IndexMap<String, Term>,
    entity_sets: IndexMap<String, EntitySet>,
    operations: IndexMap<String, BoundOperation>,
}

impl Model {
    /// An empty model; every lookup misses.
    pub fn empty() -> Arc<dyn EdmModel> {
        Arc::new(Model::default())
    }
}

impl EdmModel for Model {
    fn find_structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.structured.get(name)
    }

    fn find_enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    fn find_term(&self, name: &str) -> Option<&Term> {
        self.terms.get(name)
    }

    fn find_entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.entity_sets.get(name)
    }

    fn operations_bound_to(&self, binding_type: &str) -> Vec<&BoundOperation> {
        self.operations
            .values()
            .filter(|op| op.binding_type == binding_type)
            .collect()
    }

    fn find_operation(&self, name: &str) -> Option<&BoundOperation> {
        self.operations.get(name)
    }
}

/// Assembles a [`Model`].
#[derive(Default)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn structured_type(mut self, ty: StructuredType) -> Self {
        self.model.structured.insert(ty.name.clone(), ty);
        self
    }

    #[must_use]
    pub fn enum_type(mut self, ty: EnumType) -> Self {
        self.model.enums.insert(ty.name.clone(), ty);
        self
    }

    #[must_use]
    pub fn term(mut self, name: &str, type_ref: EdmTypeRef) -> Self {
        self.model.terms.insert(
            name.to_string(),
            Term {
                name: name.to_string(),
                type_ref,
            },
        );
        self
    }

    #[must_use]
    pub fn entity_set(mut self, name: &str, entity_type: &str) -> Self {
        self.model.entity_sets.insert(
            name.to_string(),
            EntitySet {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            },
        );
        self
    }

    #[must_use]
    pub fn action(self, name: &str, binding_type: &str) -> Self {
        self.operation(name, OperationKind::Action, binding_type)
    }

    #[must_use]
    pub fn function(self, name: &str, binding_type: &str) -> Self {
        self.operation(name, OperationKind::Function, binding_type)
    }

    fn operation(mut self, name: &str, kind: OperationKind, binding_type: &str) -> Self {
        self.model.operations.insert(
            name.to_string(),
            BoundOperation {
                name: name.to_string(),
                kind,
                binding_type: binding_type.to_string(),
            },
        );
        self
    }

    pub fn build(self) -> Arc<dyn EdmModel> {
        Arc::new(self.model)
    }
}

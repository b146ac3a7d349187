//! Model metadata.
//!
//! Application types are described once with [`TypeDescriptor`] and
//! [`PropertyDescriptor`], registered with a [`ModelMetadataProvider`], and
//! from then on every binder and validator works against immutable
//! [`ModelMetadata`] handed out by the provider's caches.
//!
//! # Example
//!
//! ```
//! use daedalus_core::metadata::{
//!     ModelMetadataProvider, ModelType, PropertyDescriptor, TypeDescriptor, ValidationRule,
//! };
//!
//! let provider = ModelMetadataProvider::builder()
//!     .register(
//!         TypeDescriptor::new("Person")
//!             .property(PropertyDescriptor::new("name", ModelType::string()).validator(ValidationRule::required()))
//!             .property(PropertyDescriptor::new("age", ModelType::int())),
//!     )
//!     .build();
//!
//! let person = provider.for_type(&ModelType::complex("Person"));
//! let properties = provider.properties(&person);
//! assert_eq!(properties.len(), 2);
//! assert!(properties[0].is_required());
//! ```

use crate::value::ModelValue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Primitive value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// UTF-8 text.
    String,
    /// `true` / `false`.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    UInt,
    /// 64-bit float.
    Float,
    /// A single character.
    Char,
    /// UUID.
    Uuid,
    /// RFC 3339 timestamp.
    DateTime,
}

impl ScalarKind {
    /// Returns the display name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::UInt => "UInt",
            Self::Float => "Float",
            Self::Char => "Char",
            Self::Uuid => "Uuid",
            Self::DateTime => "DateTime",
        }
    }
}

/// Declared variants of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSpec {
    /// Enum type name.
    pub name: String,
    /// Variant names with their numeric values.
    pub variants: Vec<(String, i64)>,
    /// Whether values may combine variants (`"Read, Write"`).
    pub flags: bool,
}

impl EnumSpec {
    /// Creates an enum whose variants are numbered from zero.
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants
                .into_iter()
                .zip(0_i64..)
                .map(|(variant, value)| (variant.into(), value))
                .collect(),
            flags: false,
        }
    }

    /// Creates a flags enum from explicit values.
    pub fn flags<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
            flags: true,
        }
    }
}

/// Shape of a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelType {
    /// A primitive.
    Scalar(ScalarKind),
    /// An enum.
    Enum(Arc<EnumSpec>),
    /// An optional wrapper around a value type.
    Nullable(Box<ModelType>),
    /// A sequence.
    Collection(Box<ModelType>),
    /// A key/value map.
    Dictionary(Box<ModelType>, Box<ModelType>),
    /// A registered complex type, by name.
    Complex(String),
    /// An uploaded file.
    FormFile,
    /// The whole form.
    FormCollection,
    /// The request cancellation token.
    CancellationToken,
    /// A service resolved by type name.
    Service(String),
}

impl ModelType {
    /// `String`.
    #[must_use]
    pub const fn string() -> Self {
        Self::Scalar(ScalarKind::String)
    }

    /// `Int`.
    #[must_use]
    pub const fn int() -> Self {
        Self::Scalar(ScalarKind::Int)
    }

    /// `Float`.
    #[must_use]
    pub const fn float() -> Self {
        Self::Scalar(ScalarKind::Float)
    }

    /// `Bool`.
    #[must_use]
    pub const fn bool() -> Self {
        Self::Scalar(ScalarKind::Bool)
    }

    /// An optional value.
    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// A list of `element`.
    #[must_use]
    pub fn list_of(element: Self) -> Self {
        Self::Collection(Box::new(element))
    }

    /// A map from `key` to `value`.
    #[must_use]
    pub fn map_of(key: Self, value: Self) -> Self {
        Self::Dictionary(Box::new(key), Box::new(value))
    }

    /// A registered complex type.
    pub fn complex(name: impl Into<String>) -> Self {
        Self::Complex(name.into())
    }

    /// An enum type.
    #[must_use]
    pub fn enumeration(spec: EnumSpec) -> Self {
        Self::Enum(Arc::new(spec))
    }

    /// A service keyed by the Rust type name of `T`.
    #[must_use]
    pub fn service<T: ?Sized + 'static>() -> Self {
        Self::Service(crate::di::service_type_name::<T>().to_string())
    }

    /// Strips a [`ModelType::Nullable`] wrapper.
    #[must_use]
    pub fn underlying(&self) -> &Self {
        match self {
            Self::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    /// Whether `null` is an acceptable value.
    #[must_use]
    pub fn accepts_null(&self) -> bool {
        match self {
            Self::Nullable(_)
            | Self::Scalar(ScalarKind::String)
            | Self::Collection(_)
            | Self::Dictionary(..)
            | Self::Complex(_)
            | Self::FormFile
            | Self::FormCollection
            | Self::Service(_) => true,
            Self::Scalar(_) | Self::Enum(_) | Self::CancellationToken => false,
        }
    }

    /// Whether the type converts from a single string.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(self.underlying(), Self::Scalar(_) | Self::Enum(_))
    }

    /// Whether the type is a registered complex type.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self.underlying(), Self::Complex(_))
    }

    /// Element type of a collection.
    #[must_use]
    pub fn element_type(&self) -> Option<&Self> {
        match self.underlying() {
            Self::Collection(element) => Some(element.as_ref()),
            _ => None,
        }
    }

    /// Binding source implied by the type itself.
    #[must_use]
    pub fn intrinsic_binding_source(&self) -> Option<BindingSource> {
        match self.underlying() {
            Self::FormFile => Some(BindingSource::FormFile),
            Self::Collection(element) if matches!(**element, Self::FormFile) => {
                Some(BindingSource::FormFile)
            }
            Self::FormCollection => Some(BindingSource::Form),
            Self::CancellationToken => Some(BindingSource::Special),
            Self::Service(_) => Some(BindingSource::Services),
            _ => None,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.write_str(kind.name()),
            Self::Enum(spec) => f.write_str(&spec.name),
            Self::Nullable(inner) => write!(f, "{inner}?"),
            Self::Collection(element) => write!(f, "List<{element}>"),
            Self::Dictionary(key, value) => write!(f, "Map<{key}, {value}>"),
            Self::Complex(name) | Self::Service(name) => f.write_str(name),
            Self::FormFile => f.write_str("FormFile"),
            Self::FormCollection => f.write_str("FormCollection"),
            Self::CancellationToken => f.write_str("CancellationToken"),
        }
    }
}

/// Where a model's data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingSource {
    /// Any value provider (query, route, form).
    ModelBinding,
    /// The request body, read by an input formatter.
    Body,
    /// Query string.
    Query,
    /// Route values.
    Path,
    /// Form fields.
    Form,
    /// A request header.
    Header,
    /// Uploaded files.
    FormFile,
    /// The request's service provider.
    Services,
    /// Request-intrinsic values such as the cancellation token.
    Special,
    /// An application-defined source.
    Custom(String),
}

impl BindingSource {
    /// A greedy source binds the whole model itself instead of reading
    /// individual keys from value providers.
    #[must_use]
    pub const fn is_greedy(&self) -> bool {
        matches!(
            self,
            Self::Body | Self::Header | Self::FormFile | Self::Services | Self::Special
        )
    }

    /// Whether data for this source comes from the HTTP request.
    #[must_use]
    pub const fn is_from_request(&self) -> bool {
        !matches!(self, Self::Services | Self::Special)
    }

    /// Whether a value provider of source `provider` may serve a model whose
    /// binding source is `self`.
    #[must_use]
    pub fn can_accept_data_from(&self, provider: &Self) -> bool {
        match self {
            Self::ModelBinding => matches!(provider, Self::Query | Self::Path | Self::Form),
            other => other == provider,
        }
    }

    /// Display name used in diagnostics.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::ModelBinding => "ModelBinding",
            Self::Body => "Body",
            Self::Query => "Query",
            Self::Path => "Path",
            Self::Form => "Form",
            Self::Header => "Header",
            Self::FormFile => "FormFile",
            Self::Services => "Services",
            Self::Special => "Special",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Whether a property or parameter participates in binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingBehavior {
    /// Bound when data is present.
    #[default]
    Optional,
    /// A missing value is a model-state error.
    Required,
    /// Never bound.
    Never,
}

/// Binding overrides declared on a property or parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingInfo {
    /// Restricts binding to one source.
    pub binding_source: Option<BindingSource>,
    /// Overrides the key prefix used for lookups.
    pub binder_model_name: Option<String>,
    /// Include-list of properties bound on a complex model.
    pub property_filter: Option<Arc<[String]>>,
    /// Binding behavior.
    pub binding_behavior: Option<BindingBehavior>,
}

/// A declarative validation rule.
#[derive(Clone)]
pub enum ValidationRule {
    /// Value must be present (and non-blank for strings).
    Required {
        /// Accept `""` as a present value.
        allow_empty_strings: bool,
    },
    /// String length bounds, in characters.
    StringLength {
        /// Minimum length.
        min: usize,
        /// Maximum length.
        max: usize,
    },
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// The whole string must match the pattern.
    RegularExpression(String),
    /// Minimum length of a string or collection.
    MinLength(usize),
    /// Maximum length of a string or collection.
    MaxLength(usize),
    /// Basic e-mail address shape.
    EmailAddress,
    /// Application rule returning an error message on failure.
    Custom {
        /// Rule name for diagnostics.
        name: String,
        /// Check returning `Some(message)` when the value is invalid.
        check: Arc<dyn Fn(&ModelValue) -> Option<String> + Send + Sync>,
    },
}

impl ValidationRule {
    /// `Required` that rejects blank strings.
    #[must_use]
    pub const fn required() -> Self {
        Self::Required {
            allow_empty_strings: false,
        }
    }

    /// Maximum string length.
    #[must_use]
    pub const fn string_length(max: usize) -> Self {
        Self::StringLength { min: 0, max }
    }

    /// Inclusive numeric range.
    #[must_use]
    pub const fn range(min: f64, max: f64) -> Self {
        Self::Range { min, max }
    }

    /// Custom rule.
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&ModelValue) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Returns true for [`ValidationRule::Required`].
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self, Self::Required { .. })
    }

    /// Rule name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Required { .. } => "Required",
            Self::StringLength { .. } => "StringLength",
            Self::Range { .. } => "Range",
            Self::RegularExpression(_) => "RegularExpression",
            Self::MinLength(_) => "MinLength",
            Self::MaxLength(_) => "MaxLength",
            Self::EmailAddress => "EmailAddress",
            Self::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required {
                allow_empty_strings,
            } => f
                .debug_struct("Required")
                .field("allow_empty_strings", allow_empty_strings)
                .finish(),
            Self::StringLength { min, max } => f
                .debug_struct("StringLength")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::RegularExpression(pattern) => {
                f.debug_tuple("RegularExpression").field(pattern).finish()
            }
            Self::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            Self::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            Self::EmailAddress => f.write_str("EmailAddress"),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

/// Declares one property of a complex type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// Property type.
    pub model_type: ModelType,
    /// Binding overrides.
    pub binding: BindingInfo,
    /// Name used in messages.
    pub display_name: Option<String>,
    /// Member validation rules.
    pub validators: Vec<ValidationRule>,
    /// Skip validation of this property and everything below it.
    pub validate_never: bool,
    /// Property has no setter.
    pub read_only: bool,
}

impl PropertyDescriptor {
    /// Creates a property.
    pub fn new(name: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            model_type,
            binding: BindingInfo::default(),
            display_name: None,
            validators: Vec::new(),
            validate_never: false,
            read_only: false,
        }
    }

    /// Restricts binding to a source.
    pub fn source(mut self, source: BindingSource) -> Self {
        self.binding.binding_source = Some(source);
        self
    }

    /// Binds from the request body.
    pub fn from_body(self) -> Self {
        self.source(BindingSource::Body)
    }

    /// Binds from the query string.
    pub fn from_query(self) -> Self {
        self.source(BindingSource::Query)
    }

    /// Binds from a header.
    pub fn from_header(self) -> Self {
        self.source(BindingSource::Header)
    }

    /// Overrides the lookup name.
    pub fn binder_model_name(mut self, name: impl Into<String>) -> Self {
        self.binding.binder_model_name = Some(name.into());
        self
    }

    /// A missing value is an error.
    pub fn bind_required(mut self) -> Self {
        self.binding.binding_behavior = Some(BindingBehavior::Required);
        self
    }

    /// Never bound.
    pub fn bind_never(mut self) -> Self {
        self.binding.binding_behavior = Some(BindingBehavior::Never);
        self
    }

    /// Adds a validation rule.
    pub fn validator(mut self, rule: ValidationRule) -> Self {
        self.validators.push(rule);
        self
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Excludes the property from validation.
    pub fn validate_never(mut self) -> Self {
        self.validate_never = true;
        self
    }

    /// Marks the property read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Declares a complex type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Type name.
    pub name: String,
    /// Properties in declaration order.
    pub properties: Vec<PropertyDescriptor>,
    /// Type-level validation rules, run after the properties.
    pub validators: Vec<ValidationRule>,
    /// Whether validation descends into the properties.
    pub validate_children: bool,
    /// Include-list of properties bound on this type.
    pub property_filter: Option<Arc<[String]>>,
}

impl TypeDescriptor {
    /// Creates an empty type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            validators: Vec::new(),
            validate_children: true,
            property_filter: None,
        }
    }

    /// Adds a property.
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds a type-level rule.
    pub fn validator(mut self, rule: ValidationRule) -> Self {
        self.validators.push(rule);
        self
    }

    /// Stops validation from descending into properties.
    pub fn skip_child_validation(mut self) -> Self {
        self.validate_children = false;
        self
    }

    /// Binds only the named properties.
    pub fn bind_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Declares one action parameter.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub model_type: ModelType,
    /// Binding overrides.
    pub binding: BindingInfo,
    /// Parameter validation rules.
    pub validators: Vec<ValidationRule>,
}

impl ParameterDescriptor {
    /// Creates a parameter.
    pub fn new(name: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            model_type,
            binding: BindingInfo::default(),
            validators: Vec::new(),
        }
    }

    /// Restricts binding to a source.
    pub fn source(mut self, source: BindingSource) -> Self {
        self.binding.binding_source = Some(source);
        self
    }

    /// Binds from the request body.
    pub fn from_body(self) -> Self {
        self.source(BindingSource::Body)
    }

    /// Binds from the query string.
    pub fn from_query(self) -> Self {
        self.source(BindingSource::Query)
    }

    /// Binds from route values.
    pub fn from_route(self) -> Self {
        self.source(BindingSource::Path)
    }

    /// Binds from a header.
    pub fn from_header(self) -> Self {
        self.source(BindingSource::Header)
    }

    /// Resolves from the service provider.
    pub fn from_services(self) -> Self {
        self.source(BindingSource::Services)
    }

    /// Overrides the lookup name.
    pub fn binder_model_name(mut self, name: impl Into<String>) -> Self {
        self.binding.binder_model_name = Some(name.into());
        self
    }

    /// A missing value is an error.
    pub fn bind_required(mut self) -> Self {
        self.binding.binding_behavior = Some(BindingBehavior::Required);
        self
    }

    /// Binds only the named properties of a complex parameter.
    pub fn bind_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binding.property_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a validation rule.
    pub fn validator(mut self, rule: ValidationRule) -> Self {
        self.validators.push(rule);
        self
    }
}

/// What a piece of metadata describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    /// A type.
    Type,
    /// A property of a complex type.
    Property,
    /// An action parameter.
    Parameter,
}

/// Identity of a metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    kind: MetadataKind,
    container: Option<Arc<str>>,
    name: Arc<str>,
}

impl MetadataKey {
    /// Key for a type.
    #[must_use]
    pub fn for_type(model_type: &ModelType) -> Self {
        Self {
            kind: MetadataKind::Type,
            container: None,
            name: model_type.to_string().into(),
        }
    }

    /// Key for a property of `container`.
    #[must_use]
    pub fn for_property(container: &str, name: &str) -> Self {
        Self {
            kind: MetadataKind::Property,
            container: Some(container.into()),
            name: name.into(),
        }
    }

    /// Key for a parameter of `owner`.
    #[must_use]
    pub fn for_parameter(owner: &str, name: &str) -> Self {
        Self {
            kind: MetadataKind::Parameter,
            container: Some(owner.into()),
            name: name.into(),
        }
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> MetadataKind {
        self.kind
    }

    /// Returns the described name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{container}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Immutable description of a type, property or parameter.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    key: MetadataKey,
    model_type: ModelType,
    name: Option<String>,
    display_name: Option<String>,
    container_type: Option<String>,
    binding_source: Option<BindingSource>,
    binder_model_name: Option<String>,
    binding_behavior: BindingBehavior,
    property_filter: Option<Arc<[String]>>,
    validators: Vec<ValidationRule>,
    validate_children: bool,
    validate_never: bool,
    read_only: bool,
}

impl ModelMetadata {
    /// Returns the cache key.
    #[must_use]
    pub const fn key(&self) -> &MetadataKey {
        &self.key
    }

    /// Returns the metadata kind.
    #[must_use]
    pub const fn kind(&self) -> MetadataKind {
        self.key.kind
    }

    /// Returns the model type.
    #[must_use]
    pub const fn model_type(&self) -> &ModelType {
        &self.model_type
    }

    /// Property or parameter name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in messages: display name, then name, then type name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| self.model_type.to_string())
    }

    /// Owning type of a property.
    #[must_use]
    pub fn container_type(&self) -> Option<&str> {
        self.container_type.as_deref()
    }

    /// Declared or intrinsic binding source.
    #[must_use]
    pub const fn binding_source(&self) -> Option<&BindingSource> {
        self.binding_source.as_ref()
    }

    /// Lookup-name override.
    #[must_use]
    pub fn binder_model_name(&self) -> Option<&str> {
        self.binder_model_name.as_deref()
    }

    /// Binding behavior.
    #[must_use]
    pub const fn binding_behavior(&self) -> BindingBehavior {
        self.binding_behavior
    }

    /// Whether a missing value is an error.
    #[must_use]
    pub fn is_binding_required(&self) -> bool {
        self.binding_behavior == BindingBehavior::Required
    }

    /// Whether binding may assign this model.
    #[must_use]
    pub fn is_binding_allowed(&self) -> bool {
        self.binding_behavior != BindingBehavior::Never
    }

    /// Include-list of bound properties.
    #[must_use]
    pub fn property_filter(&self) -> Option<&Arc<[String]>> {
        self.property_filter.as_ref()
    }

    /// Validation rules. Member rules for properties and parameters,
    /// type-level rules for types.
    #[must_use]
    pub fn validators(&self) -> &[ValidationRule] {
        &self.validators
    }

    /// Whether a `Required` rule is declared.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.validators.iter().any(ValidationRule::is_required)
    }

    /// Whether validation descends into children.
    #[must_use]
    pub const fn validate_children(&self) -> bool {
        self.validate_children
    }

    /// Whether validation is suppressed for this node.
    #[must_use]
    pub const fn validate_never(&self) -> bool {
        self.validate_never
    }

    /// Whether the property has no setter.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Builder for [`ModelMetadataProvider`].
#[derive(Debug, Default)]
pub struct ModelMetadataProviderBuilder {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl ModelMetadataProviderBuilder {
    /// Registers a complex type. A later registration replaces an earlier one.
    pub fn register(mut self, descriptor: TypeDescriptor) -> Self {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        self
    }

    /// Builds the provider.
    #[must_use]
    pub fn build(self) -> ModelMetadataProvider {
        ModelMetadataProvider {
            types: self.types,
            type_cache: DashMap::new(),
            property_cache: DashMap::new(),
            parameter_cache: DashMap::new(),
        }
    }
}

/// Hands out cached [`ModelMetadata`].
///
/// The type registry is fixed at construction. Metadata is built lazily and
/// cached; two racing builders produce equal values and the first insert wins.
#[derive(Debug)]
pub struct ModelMetadataProvider {
    types: HashMap<String, Arc<TypeDescriptor>>,
    type_cache: DashMap<String, Arc<ModelMetadata>>,
    property_cache: DashMap<String, Arc<[Arc<ModelMetadata>]>>,
    parameter_cache: DashMap<MetadataKey, Arc<ModelMetadata>>,
}

impl Default for ModelMetadataProvider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ModelMetadataProvider {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ModelMetadataProviderBuilder {
        ModelMetadataProviderBuilder::default()
    }

    /// Returns a registered type descriptor.
    #[must_use]
    pub fn type_descriptor(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Metadata for a type.
    pub fn for_type(&self, model_type: &ModelType) -> Arc<ModelMetadata> {
        let name = model_type.to_string();
        if let Some(hit) = self.type_cache.get(&name).map(|e| Arc::clone(e.value())) {
            return hit;
        }

        let descriptor = self.descriptor_of(model_type);
        let metadata = Arc::new(ModelMetadata {
            key: MetadataKey::for_type(model_type),
            model_type: model_type.clone(),
            name: None,
            display_name: None,
            container_type: None,
            binding_source: model_type.intrinsic_binding_source(),
            binder_model_name: None,
            binding_behavior: BindingBehavior::Optional,
            property_filter: descriptor.and_then(|d| d.property_filter.clone()),
            validators: descriptor.map(|d| d.validators.clone()).unwrap_or_default(),
            validate_children: descriptor.map_or(true, |d| d.validate_children),
            validate_never: false,
            read_only: false,
        });
        Arc::clone(self.type_cache.entry(name).or_insert(metadata).value())
    }

    /// Metadata for the properties of a complex model, in declaration order.
    ///
    /// Non-complex and unregistered types have no properties.
    pub fn properties(&self, metadata: &ModelMetadata) -> Arc<[Arc<ModelMetadata>]> {
        let ModelType::Complex(type_name) = metadata.model_type.underlying() else {
            return Arc::from(Vec::new());
        };
        if let Some(hit) = self
            .property_cache
            .get(type_name)
            .map(|e| Arc::clone(e.value()))
        {
            return hit;
        }
        let Some(descriptor) = self.types.get(type_name) else {
            return Arc::from(Vec::new());
        };

        let properties: Arc<[Arc<ModelMetadata>]> = descriptor
            .properties
            .iter()
            .map(|property| Arc::new(self.build_property(descriptor, property)))
            .collect();
        Arc::clone(
            self.property_cache
                .entry(type_name.clone())
                .or_insert(properties)
                .value(),
        )
    }

    /// Metadata for a named property of a complex model.
    pub fn property(&self, metadata: &ModelMetadata, name: &str) -> Option<Arc<ModelMetadata>> {
        self.properties(metadata)
            .iter()
            .find(|p| p.name() == Some(name))
            .cloned()
    }

    /// Metadata for an action parameter owned by `owner`.
    pub fn for_parameter(&self, owner: &str, parameter: &ParameterDescriptor) -> Arc<ModelMetadata> {
        let key = MetadataKey::for_parameter(owner, &parameter.name);
        if let Some(hit) = self
            .parameter_cache
            .get(&key)
            .map(|e| Arc::clone(e.value()))
        {
            return hit;
        }

        let descriptor = self.descriptor_of(&parameter.model_type);
        let binding = &parameter.binding;
        let metadata = Arc::new(ModelMetadata {
            key: key.clone(),
            model_type: parameter.model_type.clone(),
            name: Some(parameter.name.clone()),
            display_name: None,
            container_type: None,
            binding_source: binding
                .binding_source
                .clone()
                .or_else(|| parameter.model_type.intrinsic_binding_source()),
            binder_model_name: binding.binder_model_name.clone(),
            binding_behavior: binding.binding_behavior.unwrap_or_default(),
            property_filter: binding
                .property_filter
                .clone()
                .or_else(|| descriptor.and_then(|d| d.property_filter.clone())),
            validators: parameter.validators.clone(),
            validate_children: descriptor.map_or(true, |d| d.validate_children),
            validate_never: false,
            read_only: false,
        });
        Arc::clone(self.parameter_cache.entry(key).or_insert(metadata).value())
    }

    /// Metadata for the element type of a collection model.
    pub fn element_metadata(&self, metadata: &ModelMetadata) -> Option<Arc<ModelMetadata>> {
        metadata
            .model_type
            .element_type()
            .map(|element| self.for_type(element))
    }

    /// Metadata for the key and value types of a dictionary model.
    pub fn dictionary_metadata(
        &self,
        metadata: &ModelMetadata,
    ) -> Option<(Arc<ModelMetadata>, Arc<ModelMetadata>)> {
        match metadata.model_type.underlying() {
            ModelType::Dictionary(key, value) => Some((self.for_type(key), self.for_type(value))),
            _ => None,
        }
    }

    fn descriptor_of(&self, model_type: &ModelType) -> Option<&Arc<TypeDescriptor>> {
        match model_type.underlying() {
            ModelType::Complex(name) => self.types.get(name),
            _ => None,
        }
    }

    fn build_property(&self, container: &TypeDescriptor, property: &PropertyDescriptor) -> ModelMetadata {
        let descriptor = self.descriptor_of(&property.model_type);
        let binding = &property.binding;
        ModelMetadata {
            key: MetadataKey::for_property(&container.name, &property.name),
            model_type: property.model_type.clone(),
            name: Some(property.name.clone()),
            display_name: property.display_name.clone(),
            container_type: Some(container.name.clone()),
            binding_source: binding
                .binding_source
                .clone()
                .or_else(|| property.model_type.intrinsic_binding_source()),
            binder_model_name: binding.binder_model_name.clone(),
            binding_behavior: binding.binding_behavior.unwrap_or_default(),
            property_filter: binding
                .property_filter
                .clone()
                .or_else(|| descriptor.and_then(|d| d.property_filter.clone())),
            validators: property.validators.clone(),
            validate_children: descriptor.map_or(true, |d| d.validate_children),
            validate_never: property.validate_never,
            read_only: property.read_only,
        }
    }
}

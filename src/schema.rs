//! Declarative entity schemas.
//!
//! An [`EntitySchema`] is an ordered mapping of field names to [`FieldSpec`]s,
//! defined once at startup and consumed repeatedly per request. Request
//! validation, storage constraints, route behaviour, and synthetic data are
//! all derived from this description.
//!
//! ```rust
//! use crudgen::schema::{EntitySchema, FieldSpec, SemanticHint};
//! use regex::Regex;
//!
//! let users = EntitySchema::new("users")
//!     .field(
//!         "email",
//!         FieldSpec::string()
//!             .required("email is required")
//!             .unique()
//!             .pattern(Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap(), "invalid email")
//!             .hint(SemanticHint::Email),
//!     )
//!     .field("age", FieldSpec::number().range(0.0, 130.0));
//! ```

use regex::Regex;

/// Discriminated field type.
///
/// Dispatch over field types is always an explicit `match` on this enum;
/// there is no marker-based lookup anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    /// Opaque identifier pointing at another registered entity.
    Reference,
    /// Non-empty array of strings. Per-element constraints are not applied.
    StringArray,
    /// Escape hatch: accepts any value, no constraints. Unusual fields never
    /// block schema generation.
    Any,
}

impl FieldKind {
    /// Type name used in validation messages.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Reference => "reference",
            Self::StringArray => "string array",
            Self::Any => "any",
        }
    }
}

/// Declared intent of a string field, used by the synthetic record generator
/// to produce realistic values instead of pattern-shaped gibberish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticHint {
    Email,
    Url,
    /// Digit-only string, e.g. a phone number or postal code.
    Numeric,
    FreeText,
}

/// A pattern constraint with its rejection message.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub regex: Regex,
    pub message: String,
}

/// One field's type and validation constraints.
///
/// Built with the kind constructors (`string()`, `number()`, ...) followed by
/// modifier methods. Modifiers are type-appropriate: length and pattern apply
/// to strings, numeric range to numbers; applying one to the wrong kind is a
/// programming error caught by a debug assertion.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    /// When `Some`, the field is mandatory on create; the value is the
    /// rejection message.
    pub required: Option<String>,
    pub unique: bool,
    pub pattern: Option<PatternRule>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Entity name a `Reference` field resolves against.
    pub reference_target: Option<String>,
    pub hint: Option<SemanticHint>,
}

impl FieldSpec {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            required: None,
            unique: false,
            pattern: None,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            reference_target: None,
            hint: None,
        }
    }

    #[must_use]
    pub fn string() -> Self {
        Self::of_kind(FieldKind::String)
    }

    #[must_use]
    pub fn number() -> Self {
        Self::of_kind(FieldKind::Number)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::of_kind(FieldKind::Boolean)
    }

    #[must_use]
    pub fn date() -> Self {
        Self::of_kind(FieldKind::Date)
    }

    /// A field referencing a record of another registered entity.
    #[must_use]
    pub fn reference(target: impl Into<String>) -> Self {
        let mut spec = Self::of_kind(FieldKind::Reference);
        spec.reference_target = Some(target.into());
        spec
    }

    #[must_use]
    pub fn string_array() -> Self {
        Self::of_kind(FieldKind::StringArray)
    }

    /// Unconstrained field accepting any value.
    #[must_use]
    pub fn any() -> Self {
        Self::of_kind(FieldKind::Any)
    }

    /// Mark the field mandatory on create, with the given rejection message.
    #[must_use]
    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    /// Enforce uniqueness across the collection.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Constrain string values to a pattern.
    #[must_use]
    pub fn pattern(mut self, regex: Regex, message: impl Into<String>) -> Self {
        debug_assert!(self.kind == FieldKind::String, "pattern applies to string fields");
        self.pattern = Some(PatternRule {
            regex,
            message: message.into(),
        });
        self
    }

    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        debug_assert!(self.kind == FieldKind::String, "length applies to string fields");
        self.min_length = Some(min);
        self
    }

    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        debug_assert!(self.kind == FieldKind::String, "length applies to string fields");
        self.max_length = Some(max);
        self
    }

    /// Constrain string length to `[min, max]`.
    #[must_use]
    pub fn length(self, min: usize, max: usize) -> Self {
        self.min_length(min).max_length(max)
    }

    /// Constrain numeric values to `[min, max]`.
    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        debug_assert!(self.kind == FieldKind::Number, "range applies to number fields");
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Declare the semantic shape of a string field for synthetic generation.
    #[must_use]
    pub fn hint(mut self, hint: SemanticHint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Whether the field is mandatory on create.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required.is_some()
    }
}

/// Ordered field-name → [`FieldSpec`] mapping describing one resource type.
///
/// Immutable after construction; shared across requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    fields: Vec<(String, FieldSpec)>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field. Declaration order is preserved and meaningful: it is
    /// the order constraints are reported and synthetic values are produced.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, spec)| spec)
    }

    /// Fields declared unique, in declaration order.
    pub fn unique_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields().filter(|(_, spec)| spec.unique)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

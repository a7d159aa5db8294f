use std::fmt;

/// Declared shape of a mapped member, resolved from the member's Rust type when
/// the descriptor table is generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Boolean,
    Integer,
    Float,
    Text,
    DateTime,
    Uuid,
    /// Free-form JSON value.
    Json,
    /// Nested complex type, carrying its type name.
    Object(String),
    Array(Box<DeclaredType>),
}

impl DeclaredType {
    pub fn array_of(inner: DeclaredType) -> Self {
        Self::Array(Box::new(inner))
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Json)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn element_type(&self) -> Option<&DeclaredType> {
        match self {
            Self::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Members whose values can appear in a text index.
    pub fn is_textual(&self) -> bool {
        match self {
            Self::Text => true,
            Self::Array(inner) => inner.is_textual(),
            _ => false,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::DateTime => write!(f, "DATETIME"),
            Self::Uuid => write!(f, "UUID"),
            Self::Json => write!(f, "JSON"),
            Self::Object(name) => write!(f, "OBJECT<{}>", name),
            Self::Array(inner) => write!(f, "ARRAY<{}>", inner),
        }
    }
}

/// How a member is written to the document store.
///
/// Resolved once at registration so writes never inspect runtime shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingKind {
    Scalar,
    JsonObject,
    /// Array of complex elements. Polymorphism discriminators are stripped.
    ObjectArray,
    ScalarArray,
}

impl EncodingKind {
    pub fn resolve(declared: &DeclaredType, json_encoded: bool) -> Self {
        if json_encoded {
            // stored as text
            return Self::Scalar;
        }
        match declared {
            DeclaredType::Object(_) | DeclaredType::Json => Self::JsonObject,
            DeclaredType::Array(inner) if inner.is_complex() || inner.is_array() => {
                Self::ObjectArray
            }
            DeclaredType::Array(_) => Self::ScalarArray,
            _ => Self::Scalar,
        }
    }

    pub fn is_complex_collection(&self) -> bool {
        matches!(self, Self::ObjectArray)
    }
}

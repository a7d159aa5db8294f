use serde_json::Value as JsonValue;
use std::fmt;

/// Comparison applied by a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    /// Value must be an array; matches when the attribute equals any element.
    In,
    /// Value is ignored. Matches null and missing attributes.
    IsNull,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 11] = [
        Self::Equals,
        Self::NotEquals,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
        Self::IsNull,
    ];

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterThanOrEqual | Self::LessThan | Self::LessThanOrEqual
        )
    }

    /// Text pattern operators; they only ever match string values.
    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "eq",
            Self::NotEquals => "neq",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "lte",
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
            Self::In => "in",
            Self::IsNull => "is-null",
        };
        f.write_str(name)
    }
}

/// Attribute named by a filter leaf.
///
/// Ordinary references resolve against the entity descriptor (member name or
/// storage column). Extended references address a free-form property stored
/// in the extension area of an extendable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrRef {
    name: String,
    extended: bool,
}

impl AttrRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extended: false,
        }
    }

    pub fn extended(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extended: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl From<&str> for AttrRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AttrRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "ext:{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterLeaf {
    pub attribute: AttrRef,
    pub operator: FilterOperator,
    pub value: JsonValue,
}

/// Backend-agnostic filter tree.
///
/// `And(vec![])` matches everything and `Or(vec![])` matches nothing; use
/// [`FilterNode::all`] and [`FilterNode::none`] to say so explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf(FilterLeaf),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn leaf(
        attribute: impl Into<AttrRef>,
        operator: FilterOperator,
        value: impl Into<JsonValue>,
    ) -> Self {
        Self::Leaf(FilterLeaf {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn eq(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::Equals, value)
    }

    pub fn ne(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::NotEquals, value)
    }

    pub fn gt(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::GreaterThan, value)
    }

    pub fn gte(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn lt(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::LessThan, value)
    }

    pub fn lte(attribute: impl Into<AttrRef>, value: impl Into<JsonValue>) -> Self {
        Self::leaf(attribute, FilterOperator::LessThanOrEqual, value)
    }

    pub fn contains(attribute: impl Into<AttrRef>, text: impl Into<String>) -> Self {
        Self::leaf(attribute, FilterOperator::Contains, text.into())
    }

    pub fn starts_with(attribute: impl Into<AttrRef>, text: impl Into<String>) -> Self {
        Self::leaf(attribute, FilterOperator::StartsWith, text.into())
    }

    pub fn ends_with(attribute: impl Into<AttrRef>, text: impl Into<String>) -> Self {
        Self::leaf(attribute, FilterOperator::EndsWith, text.into())
    }

    pub fn in_set<V: Into<JsonValue>>(
        attribute: impl Into<AttrRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<JsonValue> = values.into_iter().map(Into::into).collect();
        Self::leaf(attribute, FilterOperator::In, values)
    }

    pub fn is_null(attribute: impl Into<AttrRef>) -> Self {
        Self::leaf(attribute, FilterOperator::IsNull, JsonValue::Null)
    }

    pub fn and(children: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = FilterNode>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterNode) -> Self {
        Self::Not(Box::new(child))
    }

    /// Always-true filter.
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Always-false filter. Pass this to `delete_many` to make it a no-op.
    pub fn none() -> Self {
        Self::Or(Vec::new())
    }

    /// Visit every leaf, depth first.
    pub fn leaves(&self) -> Vec<&FilterLeaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a FilterLeaf>) {
        match self {
            Self::Leaf(leaf) => out.push(leaf),
            Self::And(children) | Self::Or(children) => {
                children.iter().for_each(|child| child.collect_leaves(out))
            }
            Self::Not(child) => child.collect_leaves(out),
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(leaf) => write!(f, "{} {} {}", leaf.attribute, leaf.operator, leaf.value),
            Self::And(children) | Self::Or(children) => {
                let keyword = if matches!(self, Self::And(_)) { "AND" } else { "OR" };
                write!(f, "{}(", keyword)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Self::Not(child) => write!(f, "NOT({})", child),
        }
    }
}

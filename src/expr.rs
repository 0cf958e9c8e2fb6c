use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::data::TimeBlock;

/// Comparison operator shared by predicates and aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Gt => a > b,
            CompareOp::Lt => a < b,
            CompareOp::Ge => a >= b,
            CompareOp::Le => a <= b,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of attributes a rule may reference on an enriched section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Property {
    #[serde(rename = "courseCode")]
    CourseCode,
    #[serde(rename = "classCode")]
    ClassCode,
    #[serde(rename = "professorName")]
    ProfessorName,
    #[serde(rename = "numCredits")]
    NumCredits,
    #[serde(rename = "distanceHours")]
    DistanceHours,
    #[serde(rename = "SHFHours")]
    ShfHours,
    #[serde(rename = "shouldHavePreRequisites")]
    ShouldHavePrerequisites,
    #[serde(rename = "schedule")]
    Schedule,
}

/// Value type carried by a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Text,
    Number,
    Flag,
    Schedule,
}

impl Property {
    pub const ALL: [Property; 8] = [
        Property::CourseCode,
        Property::ClassCode,
        Property::ProfessorName,
        Property::NumCredits,
        Property::DistanceHours,
        Property::ShfHours,
        Property::ShouldHavePrerequisites,
        Property::Schedule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Property::CourseCode => "courseCode",
            Property::ClassCode => "classCode",
            Property::ProfessorName => "professorName",
            Property::NumCredits => "numCredits",
            Property::DistanceHours => "distanceHours",
            Property::ShfHours => "SHFHours",
            Property::ShouldHavePrerequisites => "shouldHavePreRequisites",
            Property::Schedule => "schedule",
        }
    }

    pub fn kind(self) -> PropertyKind {
        match self {
            Property::CourseCode | Property::ClassCode | Property::ProfessorName => {
                PropertyKind::Text
            }
            Property::NumCredits | Property::DistanceHours | Property::ShfHours => {
                PropertyKind::Number
            }
            Property::ShouldHavePrerequisites => PropertyKind::Flag,
            Property::Schedule => PropertyKind::Schedule,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property read from an enriched section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Text(&'a str),
    Number(f64),
    Flag(bool),
    Schedule(&'a [TimeBlock]),
}

/// Literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Flag(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::Text(_) => "a string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Flag(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Flag(b)
    }
}

/// Relation checked between every pair of selected sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Relation {
    /// The two sections must differ on the compared properties.
    #[serde(rename = "!=")]
    NotEqual,
    /// The two sections' weekly blocks must not intersect.
    #[serde(rename = "overlaps")]
    Overlaps,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::NotEqual => f.write_str("!="),
            Relation::Overlaps => f.write_str("overlaps"),
        }
    }
}

/// Params of a custom rule, opaque to the generic evaluator.
pub type Params = Map<String, JsonValue>;

/// One scheduling rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "WireNode", into = "WireNode")]
pub enum ExprNode {
    And(Vec<ExprNode>),
    Or(Vec<ExprNode>),
    Not(Box<ExprNode>),
    /// Per-section predicate; only meaningful under a quantifier or filter.
    Compare {
        op: CompareOp,
        property: Property,
        value: Value,
    },
    Some(Box<ExprNode>),
    All(Box<ExprNode>),
    Sum {
        property: Property,
        operator: CompareOp,
        value: f64,
        predicate: Option<Box<ExprNode>>,
    },
    Count {
        predicate: Box<ExprNode>,
        operator: CompareOp,
        value: f64,
    },
    Pairwise {
        relation: Relation,
        property1: Property,
        property2: Option<Property>,
        predicate: Option<Box<ExprNode>>,
    },
    Custom {
        id: String,
        params: Option<Params>,
    },
}

impl ExprNode {
    pub fn and(children: Vec<ExprNode>) -> Self {
        ExprNode::And(children)
    }

    pub fn or(children: Vec<ExprNode>) -> Self {
        ExprNode::Or(children)
    }

    pub fn not(child: ExprNode) -> Self {
        ExprNode::Not(Box::new(child))
    }

    pub fn compare(op: CompareOp, property: Property, value: impl Into<Value>) -> Self {
        ExprNode::Compare {
            op,
            property,
            value: value.into(),
        }
    }

    pub fn eq(property: Property, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Eq, property, value)
    }

    pub fn ne(property: Property, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Ne, property, value)
    }

    pub fn some(predicate: ExprNode) -> Self {
        ExprNode::Some(Box::new(predicate))
    }

    pub fn all(predicate: ExprNode) -> Self {
        ExprNode::All(Box::new(predicate))
    }

    pub fn sum(property: Property, operator: CompareOp, value: f64) -> Self {
        ExprNode::Sum {
            property,
            operator,
            value,
            predicate: None,
        }
    }

    /// Sum restricted to sections matching `predicate`.
    pub fn sum_where(
        property: Property,
        operator: CompareOp,
        value: f64,
        predicate: ExprNode,
    ) -> Self {
        ExprNode::Sum {
            property,
            operator,
            value,
            predicate: Some(Box::new(predicate)),
        }
    }

    pub fn count(predicate: ExprNode, operator: CompareOp, value: f64) -> Self {
        ExprNode::Count {
            predicate: Box::new(predicate),
            operator,
            value,
        }
    }

    pub fn pairwise(relation: Relation, property: Property) -> Self {
        ExprNode::Pairwise {
            relation,
            property1: property,
            property2: None,
            predicate: None,
        }
    }

    pub fn custom(id: impl Into<String>) -> Self {
        ExprNode::Custom {
            id: id.into(),
            params: None,
        }
    }

    pub fn custom_with(id: impl Into<String>, params: Params) -> Self {
        ExprNode::Custom {
            id: id.into(),
            params: Some(params),
        }
    }

    /// The `op` tag this node serializes with.
    pub fn op_name(&self) -> &'static str {
        match self {
            ExprNode::And(_) => "and",
            ExprNode::Or(_) => "or",
            ExprNode::Not(_) => "not",
            ExprNode::Compare { op, .. } => op.as_str(),
            ExprNode::Some(_) => "some",
            ExprNode::All(_) => "all",
            ExprNode::Sum { .. } => "sum",
            ExprNode::Count { .. } => "count",
            ExprNode::Pairwise { .. } => "pairwise",
            ExprNode::Custom { .. } => "custom",
        }
    }
}

// Serialized shape: one record per node, comparisons tagged by their operator.

#[derive(Deserialize, Serialize)]
struct WireComparison {
    property: Property,
    value: Value,
}

#[derive(Deserialize, Serialize)]
#[serde(tag = "op")]
enum WireNode {
    #[serde(rename = "and")]
    And { children: Vec<ExprNode> },
    #[serde(rename = "or")]
    Or { children: Vec<ExprNode> },
    #[serde(rename = "not")]
    Not { child: Box<ExprNode> },
    #[serde(rename = "==")]
    Eq(WireComparison),
    #[serde(rename = "!=")]
    Ne(WireComparison),
    #[serde(rename = ">")]
    Gt(WireComparison),
    #[serde(rename = "<")]
    Lt(WireComparison),
    #[serde(rename = ">=")]
    Ge(WireComparison),
    #[serde(rename = "<=")]
    Le(WireComparison),
    #[serde(rename = "some")]
    Some { predicate: Box<ExprNode> },
    #[serde(rename = "all")]
    All { predicate: Box<ExprNode> },
    #[serde(rename = "sum")]
    Sum {
        property: Property,
        operator: CompareOp,
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<Box<ExprNode>>,
    },
    #[serde(rename = "count")]
    Count {
        predicate: Box<ExprNode>,
        operator: CompareOp,
        value: f64,
    },
    #[serde(rename = "pairwise")]
    Pairwise {
        relation: Relation,
        property1: Property,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property2: Option<Property>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicate: Option<Box<ExprNode>>,
    },
    #[serde(rename = "custom")]
    Custom {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Params>,
    },
}

impl From<WireNode> for ExprNode {
    fn from(wire: WireNode) -> Self {
        let compare = |op, c: WireComparison| ExprNode::Compare {
            op,
            property: c.property,
            value: c.value,
        };
        match wire {
            WireNode::And { children } => ExprNode::And(children),
            WireNode::Or { children } => ExprNode::Or(children),
            WireNode::Not { child } => ExprNode::Not(child),
            WireNode::Eq(c) => compare(CompareOp::Eq, c),
            WireNode::Ne(c) => compare(CompareOp::Ne, c),
            WireNode::Gt(c) => compare(CompareOp::Gt, c),
            WireNode::Lt(c) => compare(CompareOp::Lt, c),
            WireNode::Ge(c) => compare(CompareOp::Ge, c),
            WireNode::Le(c) => compare(CompareOp::Le, c),
            WireNode::Some { predicate } => ExprNode::Some(predicate),
            WireNode::All { predicate } => ExprNode::All(predicate),
            WireNode::Sum {
                property,
                operator,
                value,
                predicate,
            } => ExprNode::Sum {
                property,
                operator,
                value,
                predicate,
            },
            WireNode::Count {
                predicate,
                operator,
                value,
            } => ExprNode::Count {
                predicate,
                operator,
                value,
            },
            WireNode::Pairwise {
                relation,
                property1,
                property2,
                predicate,
            } => ExprNode::Pairwise {
                relation,
                property1,
                property2,
                predicate,
            },
            WireNode::Custom { id, params } => ExprNode::Custom { id, params },
        }
    }
}

impl From<ExprNode> for WireNode {
    fn from(node: ExprNode) -> Self {
        match node {
            ExprNode::And(children) => WireNode::And { children },
            ExprNode::Or(children) => WireNode::Or { children },
            ExprNode::Not(child) => WireNode::Not { child },
            ExprNode::Compare {
                op,
                property,
                value,
            } => {
                let c = WireComparison { property, value };
                match op {
                    CompareOp::Eq => WireNode::Eq(c),
                    CompareOp::Ne => WireNode::Ne(c),
                    CompareOp::Gt => WireNode::Gt(c),
                    CompareOp::Lt => WireNode::Lt(c),
                    CompareOp::Ge => WireNode::Ge(c),
                    CompareOp::Le => WireNode::Le(c),
                }
            }
            ExprNode::Some(predicate) => WireNode::Some { predicate },
            ExprNode::All(predicate) => WireNode::All { predicate },
            ExprNode::Sum {
                property,
                operator,
                value,
                predicate,
            } => WireNode::Sum {
                property,
                operator,
                value,
                predicate,
            },
            ExprNode::Count {
                predicate,
                operator,
                value,
            } => WireNode::Count {
                predicate,
                operator,
                value,
            },
            ExprNode::Pairwise {
                relation,
                property1,
                property2,
                predicate,
            } => WireNode::Pairwise {
                relation,
                property1,
                property2,
                predicate,
            },
            ExprNode::Custom { id, params } => WireNode::Custom { id, params },
        }
    }
}

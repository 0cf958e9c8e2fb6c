use crate::data::EnrichedSection;
use crate::error::{RuleError, RuleResult};
use crate::expr::{CompareOp, ExprNode, Property, PropertyValue, Value};

/// Evaluates a per-section predicate.
///
/// Only `and`, `or`, `not` and comparisons are accepted; any other node is a
/// malformed rule, never a silent `false`.
pub fn eval_predicate(predicate: &ExprNode, section: &EnrichedSection<'_>) -> RuleResult<bool> {
    match predicate {
        ExprNode::And(children) => {
            for child in children {
                if !eval_predicate(child, section)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ExprNode::Or(children) => {
            for child in children {
                if eval_predicate(child, section)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ExprNode::Not(child) => Ok(!eval_predicate(child, section)?),
        ExprNode::Compare {
            op,
            property,
            value,
        } => compare(section.value(*property), *op, *property, value),
        other => Err(RuleError::NotAPredicate {
            op: other.op_name(),
        }),
    }
}

fn compare(
    actual: PropertyValue<'_>,
    op: CompareOp,
    property: Property,
    expected: &Value,
) -> RuleResult<bool> {
    let mismatch = || RuleError::TypeMismatch {
        property,
        op: op.to_string(),
        found: expected.type_name(),
    };
    match (actual, expected) {
        (PropertyValue::Number(a), Value::Number(b)) => Ok(op.apply(a, *b)),
        (PropertyValue::Text(a), Value::Text(b)) if op.is_equality() => {
            Ok((a == b.as_str()) == (op == CompareOp::Eq))
        }
        (PropertyValue::Flag(a), Value::Flag(b)) if op.is_equality() => {
            Ok((a == *b) == (op == CompareOp::Eq))
        }
        (PropertyValue::Schedule(_), _) => Err(RuleError::InvalidProperty {
            property,
            context: "a comparison",
        }),
        _ => Err(mismatch()),
    }
}

use serde_json::Value as JsonValue;

use crate::custom::CustomRuleRegistry;
use crate::error::{RuleError, RuleResult};
use crate::evaluator::check_pairwise_properties;
use crate::expr::{CompareOp, ExprNode, Property, PropertyKind, Value};

/// Deserializes and validates an untrusted rule.
pub fn parse_rule(raw: &JsonValue, registry: &CustomRuleRegistry) -> RuleResult<ExprNode> {
    let node: ExprNode =
        serde_json::from_value(raw.clone()).map_err(|e| RuleError::Malformed(e.to_string()))?;
    validate_rule(&node, registry)?;
    Ok(node)
}

pub fn validate_rules(rules: &[ExprNode], registry: &CustomRuleRegistry) -> RuleResult<()> {
    rules.iter().try_for_each(|rule| validate_rule(rule, registry))
}

/// Checks a rule evaluated against a whole selection.
pub fn validate_rule(node: &ExprNode, registry: &CustomRuleRegistry) -> RuleResult<()> {
    match node {
        ExprNode::And(children) | ExprNode::Or(children) => {
            validate_rules(children, registry)
        }
        ExprNode::Not(child) => validate_rule(child, registry),
        ExprNode::Compare { op, .. } => Err(RuleError::StandaloneComparison { op: *op }),
        ExprNode::Some(predicate) | ExprNode::All(predicate) => validate_predicate(predicate),
        ExprNode::Sum {
            property,
            value,
            predicate,
            ..
        } => {
            if property.kind() != PropertyKind::Number {
                return Err(RuleError::InvalidProperty {
                    property: *property,
                    context: "a sum",
                });
            }
            check_finite(*value)?;
            predicate.as_deref().map_or(Ok(()), validate_predicate)
        }
        ExprNode::Count {
            predicate, value, ..
        } => {
            check_finite(*value)?;
            validate_predicate(predicate)
        }
        ExprNode::Pairwise {
            relation,
            property1,
            property2,
            predicate,
        } => {
            check_pairwise_properties(*relation, *property1, property2.unwrap_or(*property1))?;
            predicate.as_deref().map_or(Ok(()), validate_predicate)
        }
        ExprNode::Custom { id, params } => registry.get(id)?.check_params(params.as_ref()),
    }
}

/// Checks a per-section predicate.
pub fn validate_predicate(node: &ExprNode) -> RuleResult<()> {
    match node {
        ExprNode::And(children) | ExprNode::Or(children) => {
            children.iter().try_for_each(validate_predicate)
        }
        ExprNode::Not(child) => validate_predicate(child),
        ExprNode::Compare {
            op,
            property,
            value,
        } => check_comparison(*op, *property, value),
        other => Err(RuleError::NotAPredicate {
            op: other.op_name(),
        }),
    }
}

fn check_comparison(op: CompareOp, property: Property, value: &Value) -> RuleResult<()> {
    match (property.kind(), value) {
        (PropertyKind::Number, Value::Number(n)) => check_finite(*n),
        (PropertyKind::Text, Value::Text(_)) | (PropertyKind::Flag, Value::Flag(_))
            if op.is_equality() =>
        {
            Ok(())
        }
        (PropertyKind::Schedule, _) => Err(RuleError::InvalidProperty {
            property,
            context: "a comparison",
        }),
        _ => Err(RuleError::TypeMismatch {
            property,
            op: op.to_string(),
            found: value.type_name(),
        }),
    }
}

fn check_finite(value: f64) -> RuleResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RuleError::Malformed(format!("{value} is not a finite number")))
    }
}

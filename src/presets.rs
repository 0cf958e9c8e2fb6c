use serde_json::json;

use crate::custom::{FORBID_CLASSES_ON_DAYS, NO_GAPS_BY_DAY, REQUIRE_CO_REQUISITES};
use crate::data::Weekday;
use crate::expr::{CompareOp, ExprNode, Params, Property, Relation, Value};

/// Default ceiling on the total credit weight of a timetable.
pub const DEFAULT_MAX_CREDIT_LOAD: u32 = 30;

/// Rules every generated timetable must satisfy, checked like any user rule.
pub fn system_rules(max_credits: u32) -> Vec<ExprNode> {
    vec![no_overlaps(), max_credit_load(max_credits), course_unique()]
}

/// Every selected section must have one of `values` for `property`.
///
/// An empty list places no restriction and yields an empty `and`.
pub fn property_value_in(
    property: Property,
    values: impl IntoIterator<Item = Value>,
) -> ExprNode {
    let branches: Vec<_> = values
        .into_iter()
        .map(|value| ExprNode::compare(CompareOp::Eq, property, value))
        .collect();
    if branches.is_empty() {
        return ExprNode::and(vec![]);
    }
    ExprNode::all(ExprNode::or(branches))
}

pub fn no_gaps_by_day() -> ExprNode {
    ExprNode::custom(NO_GAPS_BY_DAY)
}

pub fn forbid_classes_on_days(days: &[Weekday]) -> ExprNode {
    let params: Params = json!({ "days": days })
        .as_object()
        .cloned()
        .unwrap_or_default();
    ExprNode::custom_with(FORBID_CLASSES_ON_DAYS, params)
}

pub fn require_co_requisites() -> ExprNode {
    ExprNode::custom(REQUIRE_CO_REQUISITES)
}

pub fn no_overlaps() -> ExprNode {
    ExprNode::pairwise(Relation::Overlaps, Property::Schedule)
}

pub fn max_credit_load(max: u32) -> ExprNode {
    ExprNode::sum(Property::NumCredits, CompareOp::Le, f64::from(max))
}

pub fn min_credit_load(min: u32) -> ExprNode {
    ExprNode::sum(Property::NumCredits, CompareOp::Ge, f64::from(min))
}

/// No two selected sections of the same course.
pub fn course_unique() -> ExprNode {
    ExprNode::pairwise(Relation::NotEqual, Property::CourseCode)
}

/// Only sections of the listed courses may be selected.
pub fn available_courses<S: AsRef<str>>(courses: &[S]) -> ExprNode {
    property_value_in(
        Property::CourseCode,
        courses.iter().map(|c| Value::from(c.as_ref())),
    )
}

/// Each listed course must be in the timetable.
pub fn minimum_courses_set<S: AsRef<str>>(courses: &[S]) -> ExprNode {
    ExprNode::and(
        courses
            .iter()
            .map(|c| ExprNode::some(ExprNode::eq(Property::CourseCode, c.as_ref())))
            .collect(),
    )
}

/// The listed courses may not all be taken together.
pub fn forbid_course_combo<S: AsRef<str>>(courses: &[S]) -> ExprNode {
    ExprNode::not(minimum_courses_set(courses))
}

/// None of the listed courses may be taken.
pub fn forbid_each_course<S: AsRef<str>>(courses: &[S]) -> ExprNode {
    ExprNode::not(ExprNode::or(
        courses
            .iter()
            .map(|c| ExprNode::some(ExprNode::eq(Property::CourseCode, c.as_ref())))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_in_shape() {
        let rule = property_value_in(Property::ProfessorName, vec![Value::from("Dr. Jones")]);
        assert_eq!(
            rule,
            ExprNode::all(ExprNode::or(vec![ExprNode::eq(
                Property::ProfessorName,
                "Dr. Jones"
            )]))
        );
    }

    #[test]
    fn test_empty_value_list_is_unrestricted() {
        assert_eq!(available_courses::<&str>(&[]), ExprNode::and(vec![]));
    }

    #[test]
    fn test_forbid_days_params() {
        let rule = forbid_classes_on_days(&[Weekday::Saturday]);
        let ExprNode::Custom { id, params } = rule else {
            panic!("wrong variant");
        };
        assert_eq!(id, FORBID_CLASSES_ON_DAYS);
        assert_eq!(params.unwrap()["days"], json!(["saturday"]));
    }

    #[test]
    fn test_system_rules() {
        let rules = system_rules(DEFAULT_MAX_CREDIT_LOAD);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1], ExprNode::sum(Property::NumCredits, CompareOp::Le, 30.0));
    }
}

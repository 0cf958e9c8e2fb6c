use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::data::{EnrichedSection, SectionKey, TimeBlock, Weekday};
use crate::error::{RuleError, RuleResult};
use crate::evaluator::{Mode, Outcome, Status};
use crate::expr::Params;

pub const NO_GAPS_BY_DAY: &str = "no_gaps_by_day";
pub const FORBID_CLASSES_ON_DAYS: &str = "forbid_classes_on_days";
pub const REQUIRE_CO_REQUISITES: &str = "require_co_requisites";

/// A pluggable rule evaluated over the whole selection.
pub trait CustomRule: Send + Sync {
    fn id(&self) -> &str;

    /// Rejects params the rule cannot work with. Called during rule validation.
    fn check_params(&self, _params: Option<&Params>) -> RuleResult<()> {
        Ok(())
    }

    fn evaluate(
        &self,
        selection: &[EnrichedSection<'_>],
        params: Option<&Params>,
        mode: Mode,
    ) -> RuleResult<Outcome>;
}

/// Rules available to `custom` nodes, keyed by id.
#[derive(Clone, Default)]
pub struct CustomRuleRegistry {
    rules: HashMap<String, Arc<dyn CustomRule>>,
}

impl CustomRuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in rule.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NoGapsByDay);
        registry.register(ForbidClassesOnDays);
        registry.register(RequireCoRequisites);
        registry
    }

    /// Adds a rule, replacing any rule with the same id.
    pub fn register(&mut self, rule: impl CustomRule + 'static) {
        self.rules.insert(rule.id().to_string(), Arc::new(rule));
    }

    pub fn get(&self, id: &str) -> RuleResult<&dyn CustomRule> {
        self.rules
            .get(id)
            .map(|rule| rule.as_ref())
            .ok_or_else(|| RuleError::UnknownCustomRule(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str).sorted()
    }
}

impl fmt::Debug for CustomRuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRuleRegistry")
            .field("rules", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

fn outcome(mode: Mode, status: Status, reason: impl FnOnce() -> String) -> Outcome {
    if mode == Mode::Explain {
        Outcome::with_reasons(status, vec![reason()])
    } else {
        Outcome::new(status)
    }
}

/// No idle interval between consecutive classes of the same day.
///
/// A later pick can always fill a gap, so partial evaluation stays pending.
pub struct NoGapsByDay;

impl CustomRule for NoGapsByDay {
    fn id(&self) -> &str {
        NO_GAPS_BY_DAY
    }

    fn evaluate(
        &self,
        selection: &[EnrichedSection<'_>],
        _params: Option<&Params>,
        mode: Mode,
    ) -> RuleResult<Outcome> {
        if mode == Mode::Partial {
            return Ok(Outcome::new(Status::Pending));
        }

        let by_day = selection
            .iter()
            .flat_map(|s| s.schedule().iter().map(move |b| (b, s)))
            .into_group_map_by(|(b, _)| b.day);

        for day in by_day.keys().sorted() {
            let mut blocks: Vec<(&TimeBlock, &EnrichedSection<'_>)> = by_day[day].clone();
            blocks.sort_by_key(|(b, _)| (b.start_hour, b.end_hour));

            let (first, first_section) = blocks[0];
            let mut busy_until = first.end_hour;
            let mut last = first_section;
            for &(block, section) in &blocks[1..] {
                if block.start_hour > busy_until {
                    let (prev, next) = (last.key(), section.key());
                    return Ok(outcome(mode, Status::Violated, || {
                        format!(
                            "Schedule has a gap on day '{day}' between {prev} (ends at {busy_until}:00) and {next} (starts at {}:00).",
                            block.start_hour
                        )
                    }));
                }
                if block.end_hour > busy_until {
                    busy_until = block.end_hour;
                    last = section;
                }
            }
        }

        Ok(outcome(mode, Status::Satisfied, || {
            "Schedule has no gaps between classes on any day.".to_string()
        }))
    }
}

/// Rejects any class meeting on one of `params.days`.
pub struct ForbidClassesOnDays;

impl ForbidClassesOnDays {
    fn days(params: Option<&Params>) -> RuleResult<BTreeSet<Weekday>> {
        let invalid = |message: String| RuleError::InvalidParams {
            id: FORBID_CLASSES_ON_DAYS.to_string(),
            message,
        };
        let raw = params
            .and_then(|p| p.get("days"))
            .ok_or_else(|| invalid("missing 'days'".to_string()))?;
        let days: Vec<Weekday> =
            serde_json::from_value(raw.clone()).map_err(|e| invalid(e.to_string()))?;
        Ok(days.into_iter().collect())
    }
}

impl CustomRule for ForbidClassesOnDays {
    fn id(&self) -> &str {
        FORBID_CLASSES_ON_DAYS
    }

    fn check_params(&self, params: Option<&Params>) -> RuleResult<()> {
        Self::days(params).map(|_| ())
    }

    fn evaluate(
        &self,
        selection: &[EnrichedSection<'_>],
        params: Option<&Params>,
        mode: Mode,
    ) -> RuleResult<Outcome> {
        let forbidden = Self::days(params)?;
        let offending = selection.iter().find_map(|s| {
            s.schedule()
                .iter()
                .find(|b| forbidden.contains(&b.day))
                .map(|b| (s.key(), b.day))
        });

        if let Some((key, day)) = offending {
            return Ok(outcome(mode, Status::Violated, || {
                format!("Class {key} meets on forbidden day '{day}'.")
            }));
        }
        let status = if mode == Mode::Partial {
            Status::Pending
        } else {
            Status::Satisfied
        };
        Ok(outcome(mode, status, || {
            let days = forbidden.iter().join(", ");
            format!("No class meets on {days}.")
        }))
    }
}

/// Every selected course's co-requisites must be selected too.
///
/// Missing co-requisites may still be picked later, so partial evaluation
/// stays pending.
pub struct RequireCoRequisites;

impl CustomRule for RequireCoRequisites {
    fn id(&self) -> &str {
        REQUIRE_CO_REQUISITES
    }

    fn evaluate(
        &self,
        selection: &[EnrichedSection<'_>],
        _params: Option<&Params>,
        mode: Mode,
    ) -> RuleResult<Outcome> {
        if mode == Mode::Partial {
            return Ok(Outcome::new(Status::Pending));
        }

        let selected: BTreeSet<&str> = selection.iter().map(|s| s.course_code()).collect();
        let missing: Vec<(SectionKey, &str)> = selection
            .iter()
            .flat_map(|s| {
                s.course
                    .bidir_co_requisites
                    .iter()
                    .chain(&s.course.unidir_co_requisites)
                    .filter(|code| !selected.contains(code.as_str()))
                    .map(move |code| (s.key(), code.as_str()))
            })
            .collect();

        if missing.is_empty() {
            return Ok(outcome(mode, Status::Satisfied, || {
                "All co-requisites are part of the schedule.".to_string()
            }));
        }
        if mode != Mode::Explain {
            return Ok(Outcome::new(Status::Violated));
        }
        Ok(Outcome::with_reasons(
            Status::Violated,
            missing
                .into_iter()
                .map(|(key, code)| format!("Class {key} requires co-requisite course {code}."))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Catalog;
    use crate::data::fixtures::{block, course, section};
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut lab = course(
            "PH102",
            2,
            vec![section("PH102", "L1", "Dr. Brown", vec![block(Weekday::Monday, 14, 16)])],
        );
        lab.bidir_co_requisites = vec!["PH101".into()];
        Catalog::from_courses(vec![
            course(
                "CS101",
                4,
                vec![section("CS101", "T1", "Dr. Smith", vec![block(Weekday::Monday, 8, 10)])],
            ),
            course(
                "MA101",
                4,
                vec![
                    section("MA101", "T1", "Dr. Who", vec![block(Weekday::Monday, 10, 12)]),
                    section("MA101", "T2", "Dr. Who", vec![block(Weekday::Saturday, 8, 10)]),
                ],
            ),
            course(
                "PH101",
                6,
                vec![section("PH101", "T1", "Dr. Brown", vec![block(Weekday::Monday, 12, 14)])],
            ),
            lab,
        ])
    }

    fn pick<'a>(catalog: &'a Catalog, keys: &[(&str, &str)]) -> Vec<EnrichedSection<'a>> {
        let keys: Vec<_> = keys.iter().map(|(c, s)| SectionKey::new(*c, *s)).collect();
        catalog.enrich_keys(&keys).unwrap()
    }

    fn days(days: serde_json::Value) -> Params {
        json!({ "days": days }).as_object().unwrap().clone()
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CustomRuleRegistry::with_builtins();
        assert!(registry.contains(NO_GAPS_BY_DAY));
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec![FORBID_CLASSES_ON_DAYS, NO_GAPS_BY_DAY, REQUIRE_CO_REQUISITES]
        );
        assert!(matches!(
            registry.get("unknown"),
            Err(RuleError::UnknownCustomRule(_))
        ));
    }

    #[test]
    fn test_no_gaps_detects_idle_interval() {
        let catalog = catalog();
        let gapped = pick(&catalog, &[("CS101", "T1"), ("PH101", "T1")]);
        let outcome = NoGapsByDay.evaluate(&gapped, None, Mode::Explain).unwrap();
        assert_eq!(outcome.status, Status::Violated);
        assert!(outcome.reasons[0].contains("CS101-T1 (ends at 10:00)"));

        let partial = NoGapsByDay.evaluate(&gapped, None, Mode::Partial).unwrap();
        assert_eq!(partial.status, Status::Pending);

        let filled = pick(&catalog, &[("PH101", "T1"), ("CS101", "T1"), ("MA101", "T1")]);
        let outcome = NoGapsByDay.evaluate(&filled, None, Mode::Boolean).unwrap();
        assert_eq!(outcome.status, Status::Satisfied);
    }

    #[test]
    fn test_forbid_classes_on_days() {
        let catalog = catalog();
        let params = days(json!(["saturday"]));
        let weekday = pick(&catalog, &[("MA101", "T1")]);
        let saturday = pick(&catalog, &[("MA101", "T2")]);

        let rule = ForbidClassesOnDays;
        assert_eq!(
            rule.evaluate(&weekday, Some(&params), Mode::Partial).unwrap().status,
            Status::Pending
        );
        assert_eq!(
            rule.evaluate(&weekday, Some(&params), Mode::Boolean).unwrap().status,
            Status::Satisfied
        );
        assert_eq!(
            rule.evaluate(&saturday, Some(&params), Mode::Partial).unwrap().status,
            Status::Violated
        );
    }

    #[test]
    fn test_forbid_classes_on_days_params_are_checked() {
        let rule = ForbidClassesOnDays;
        assert!(rule.check_params(None).is_err());
        assert!(rule.check_params(Some(&days(json!(["caturday"])))).is_err());
        assert!(rule.check_params(Some(&days(json!(["monday", "friday"])))).is_ok());
    }

    #[test]
    fn test_co_requisites() {
        let catalog = catalog();
        let lab_only = pick(&catalog, &[("PH102", "L1")]);
        let rule = RequireCoRequisites;
        assert_eq!(
            rule.evaluate(&lab_only, None, Mode::Partial).unwrap().status,
            Status::Pending
        );
        let explained = rule.evaluate(&lab_only, None, Mode::Explain).unwrap();
        assert_eq!(explained.status, Status::Violated);
        assert_eq!(
            explained.reasons,
            vec!["Class PH102-L1 requires co-requisite course PH101."]
        );

        let both = pick(&catalog, &[("PH102", "L1"), ("PH101", "T1")]);
        assert!(rule.evaluate(&both, None, Mode::Boolean).unwrap().holds());
    }
}

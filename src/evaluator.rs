use serde::Serialize;
use std::collections::HashMap;

use crate::custom::CustomRuleRegistry;
use crate::data::EnrichedSection;
use crate::error::{RuleError, RuleResult};
use crate::expr::{CompareOp, ExprNode, Property, PropertyKind, PropertyValue, Relation};
use crate::predicate::eval_predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Boolean,
    Partial,
    Explain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Satisfied,
    Violated,
    Pending,
}

impl Status {
    pub fn from_bool(holds: bool) -> Self {
        if holds {
            Status::Satisfied
        } else {
            Status::Violated
        }
    }

    /// Satisfied and violated swap; pending stays pending.
    pub fn negate(self) -> Self {
        match self {
            Status::Satisfied => Status::Violated,
            Status::Violated => Status::Satisfied,
            Status::Pending => Status::Pending,
        }
    }
}

/// Result of evaluating one node. `reasons` is only filled in explain mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub reasons: Vec<String>,
}

impl Outcome {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            reasons: Vec::new(),
        }
    }

    pub fn with_reasons(status: Status, reasons: Vec<String>) -> Self {
        Self { status, reasons }
    }

    pub fn holds(&self) -> bool {
        self.status == Status::Satisfied
    }
}

/// Diagnostic verdict on a complete selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    pub status: Status,
    pub reasons: Vec<String>,
}

type SectionId<'a> = (&'a str, &'a str);

/// Evaluates rule trees against selections of one catalog.
///
/// Holds the pairwise overlap memo, so an evaluator belongs to a single
/// search or diagnostic call and is never shared between them.
pub struct Evaluator<'r, 'a> {
    registry: &'r CustomRuleRegistry,
    overlap_cache: HashMap<(SectionId<'a>, SectionId<'a>), bool>,
}

impl<'r, 'a> Evaluator<'r, 'a> {
    pub fn new(registry: &'r CustomRuleRegistry) -> Self {
        Self {
            registry,
            overlap_cache: HashMap::new(),
        }
    }

    /// Final accept/reject of a complete selection.
    pub fn check(
        &mut self,
        node: &ExprNode,
        selection: &[EnrichedSection<'a>],
    ) -> RuleResult<bool> {
        Ok(self.evaluate(node, selection, Mode::Boolean)?.holds())
    }

    /// Status of an in-progress selection.
    pub fn check_partial(
        &mut self,
        node: &ExprNode,
        selection: &[EnrichedSection<'a>],
    ) -> RuleResult<Status> {
        Ok(self.evaluate(node, selection, Mode::Partial)?.status)
    }

    pub fn explain(
        &mut self,
        node: &ExprNode,
        selection: &[EnrichedSection<'a>],
    ) -> RuleResult<Explanation> {
        let outcome = self.evaluate(node, selection, Mode::Explain)?;
        Ok(Explanation {
            status: outcome.status,
            reasons: outcome.reasons,
        })
    }

    /// Number of memoized section pairs.
    pub fn cached_pairs(&self) -> usize {
        self.overlap_cache.len()
    }

    pub fn evaluate(
        &mut self,
        node: &ExprNode,
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        match node {
            ExprNode::And(children) => self.eval_and(children, selection, mode),
            ExprNode::Or(children) => self.eval_or(children, selection, mode),
            ExprNode::Not(child) => {
                let inner = self.evaluate(child, selection, mode)?;
                let status = inner.status.negate();
                if mode != Mode::Explain {
                    return Ok(Outcome::new(status));
                }
                let inner_text = inner.reasons.join(" ");
                let reason = if inner.status == Status::Satisfied {
                    format!(
                        "NOT constraint failed because the inner condition was met: \"{inner_text}\""
                    )
                } else {
                    format!(
                        "NOT constraint met because the inner condition failed: \"{inner_text}\""
                    )
                };
                Ok(Outcome::with_reasons(status, vec![reason]))
            }
            ExprNode::Compare { op, .. } => Err(RuleError::StandaloneComparison { op: *op }),
            ExprNode::Some(predicate) => self.eval_some(predicate, selection, mode),
            ExprNode::All(predicate) => self.eval_all(predicate, selection, mode),
            ExprNode::Sum {
                property,
                operator,
                value,
                predicate,
            } => {
                if property.kind() != PropertyKind::Number {
                    return Err(RuleError::InvalidProperty {
                        property: *property,
                        context: "a sum",
                    });
                }
                let mut total = 0.0;
                for section in selection {
                    if let Some(filter) = predicate {
                        if !eval_predicate(filter, section)? {
                            continue;
                        }
                    }
                    if let PropertyValue::Number(n) = section.value(*property) {
                        total += n;
                    }
                }
                let met = operator.apply(total, *value);
                let status = aggregate_status(mode, *operator, met);
                Ok(aggregate_outcome(mode, status, || {
                    format!(
                        "The sum of '{property}' is {total}, which {} the condition to be {operator} {value}.",
                        if met { "satisfies" } else { "violates" }
                    )
                }))
            }
            ExprNode::Count {
                predicate,
                operator,
                value,
            } => {
                let mut count = 0usize;
                for section in selection {
                    if eval_predicate(predicate, section)? {
                        count += 1;
                    }
                }
                let met = operator.apply(count as f64, *value);
                let status = aggregate_status(mode, *operator, met);
                Ok(aggregate_outcome(mode, status, || {
                    format!(
                        "The class count is {count}, which {} the condition to be {operator} {value}.",
                        if met { "satisfies" } else { "violates" }
                    )
                }))
            }
            ExprNode::Pairwise {
                relation,
                property1,
                property2,
                predicate,
            } => self.eval_pairwise(
                *relation,
                *property1,
                property2.unwrap_or(*property1),
                predicate.as_deref(),
                selection,
                mode,
            ),
            ExprNode::Custom { id, params } => {
                let rule = self.registry.get(id)?;
                rule.evaluate(selection, params.as_ref(), mode)
            }
        }
    }

    fn eval_and(
        &mut self,
        children: &[ExprNode],
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        match mode {
            Mode::Boolean => {
                for child in children {
                    if !self.evaluate(child, selection, mode)?.holds() {
                        return Ok(Outcome::new(Status::Violated));
                    }
                }
                Ok(Outcome::new(Status::Satisfied))
            }
            Mode::Partial => {
                let mut pending = false;
                for child in children {
                    match self.evaluate(child, selection, mode)?.status {
                        Status::Violated => return Ok(Outcome::new(Status::Violated)),
                        Status::Pending => pending = true,
                        Status::Satisfied => {}
                    }
                }
                Ok(Outcome::new(if pending {
                    Status::Pending
                } else {
                    Status::Satisfied
                }))
            }
            Mode::Explain => {
                let mut reasons = Vec::new();
                let mut violated = false;
                for child in children {
                    let outcome = self.evaluate(child, selection, mode)?;
                    if outcome.status == Status::Violated {
                        violated = true;
                        reasons.extend(outcome.reasons);
                    }
                }
                if violated {
                    Ok(Outcome::with_reasons(Status::Violated, reasons))
                } else {
                    Ok(Outcome::with_reasons(
                        Status::Satisfied,
                        vec!["All sub-constraints are satisfied.".to_string()],
                    ))
                }
            }
        }
    }

    fn eval_or(
        &mut self,
        children: &[ExprNode],
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        match mode {
            Mode::Boolean => {
                for child in children {
                    if self.evaluate(child, selection, mode)?.holds() {
                        return Ok(Outcome::new(Status::Satisfied));
                    }
                }
                Ok(Outcome::new(Status::Violated))
            }
            Mode::Partial => {
                let mut pending = false;
                for child in children {
                    match self.evaluate(child, selection, mode)?.status {
                        Status::Satisfied => return Ok(Outcome::new(Status::Satisfied)),
                        Status::Pending => pending = true,
                        Status::Violated => {}
                    }
                }
                Ok(Outcome::new(if pending {
                    Status::Pending
                } else {
                    Status::Violated
                }))
            }
            Mode::Explain => {
                let mut failures = Vec::new();
                for child in children {
                    let outcome = self.evaluate(child, selection, mode)?;
                    if outcome.holds() {
                        let mut reasons =
                            vec!["At least one sub-constraint is satisfied.".to_string()];
                        reasons.extend(outcome.reasons);
                        return Ok(Outcome::with_reasons(Status::Satisfied, reasons));
                    }
                    failures.extend(outcome.reasons);
                }
                let mut reasons = vec![
                    "No sub-constraints were satisfied. Reasons for failure include:".to_string(),
                ];
                reasons.extend(failures.into_iter().map(|r| format!("  - {r}")));
                Ok(Outcome::with_reasons(Status::Violated, reasons))
            }
        }
    }

    fn eval_some(
        &mut self,
        predicate: &ExprNode,
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        let mut found = None;
        for section in selection {
            if eval_predicate(predicate, section)? {
                found = Some(section);
                break;
            }
        }
        match (found, mode) {
            (Some(_), Mode::Boolean | Mode::Partial) => Ok(Outcome::new(Status::Satisfied)),
            (None, Mode::Partial) => Ok(Outcome::new(Status::Pending)),
            (None, Mode::Boolean) => Ok(Outcome::new(Status::Violated)),
            (Some(section), Mode::Explain) => Ok(Outcome::with_reasons(
                Status::Satisfied,
                vec![format!("Condition met by class {}.", section.key())],
            )),
            (None, Mode::Explain) => Ok(Outcome::with_reasons(
                Status::Violated,
                vec!["No class in the schedule satisfies the condition.".to_string()],
            )),
        }
    }

    fn eval_all(
        &mut self,
        predicate: &ExprNode,
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        let mut failing = Vec::new();
        for section in selection {
            if !eval_predicate(predicate, section)? {
                failing.push(section);
                if mode != Mode::Explain {
                    break;
                }
            }
        }
        let status = match (failing.is_empty(), mode) {
            (false, _) => Status::Violated,
            (true, Mode::Partial) => Status::Pending,
            (true, _) => Status::Satisfied,
        };
        if mode != Mode::Explain {
            return Ok(Outcome::new(status));
        }
        let reasons = if failing.is_empty() {
            vec!["All classes in the schedule satisfy the condition.".to_string()]
        } else {
            failing
                .iter()
                .map(|s| format!("Class {} fails the condition.", s.key()))
                .collect()
        };
        Ok(Outcome::with_reasons(status, reasons))
    }

    fn eval_pairwise(
        &mut self,
        relation: Relation,
        property1: Property,
        property2: Property,
        predicate: Option<&ExprNode>,
        selection: &[EnrichedSection<'a>],
        mode: Mode,
    ) -> RuleResult<Outcome> {
        check_pairwise_properties(relation, property1, property2)?;

        let mut pool = Vec::with_capacity(selection.len());
        for section in selection {
            if predicate.map_or(Ok(true), |p| eval_predicate(p, section))? {
                pool.push(*section);
            }
        }

        for (i, a) in pool.iter().enumerate() {
            for b in &pool[i + 1..] {
                let clash = match relation {
                    Relation::NotEqual => {
                        a.value(property1) == b.value(property2)
                            || b.value(property1) == a.value(property2)
                    }
                    Relation::Overlaps => self.overlaps(a, b),
                };
                if !clash {
                    continue;
                }
                let reasons = if mode == Mode::Explain {
                    vec![match relation {
                        Relation::NotEqual => format!(
                            "Classes {} and {} have the same '{property1}', which is not allowed.",
                            a.key(),
                            b.key()
                        ),
                        Relation::Overlaps => {
                            format!("Schedules for {} and {} overlap.", a.key(), b.key())
                        }
                    }]
                } else {
                    Vec::new()
                };
                return Ok(Outcome::with_reasons(Status::Violated, reasons));
            }
        }

        let status = if mode == Mode::Partial {
            Status::Pending
        } else {
            Status::Satisfied
        };
        if mode != Mode::Explain {
            return Ok(Outcome::new(status));
        }
        Ok(Outcome::with_reasons(
            status,
            vec![format!(
                "No pair of classes violates the '{relation}' rule on property '{property1}'."
            )],
        ))
    }

    fn overlaps(&mut self, a: &EnrichedSection<'a>, b: &EnrichedSection<'a>) -> bool {
        let (x, y) = (a.id(), b.id());
        let key = if x <= y { (x, y) } else { (y, x) };
        *self
            .overlap_cache
            .entry(key)
            .or_insert_with(|| a.section.overlaps(b.section))
    }
}

/// Sums and counts only grow as sections are added, so upper bounds can be
/// refuted early and lower bounds confirmed early. Exact (in)equalities stay
/// open until the selection is final.
fn aggregate_status(mode: Mode, operator: CompareOp, met: bool) -> Status {
    if mode != Mode::Partial {
        return Status::from_bool(met);
    }
    match operator {
        CompareOp::Le | CompareOp::Lt if !met => Status::Violated,
        CompareOp::Ge | CompareOp::Gt if met => Status::Satisfied,
        _ => Status::Pending,
    }
}

fn aggregate_outcome(mode: Mode, status: Status, reason: impl FnOnce() -> String) -> Outcome {
    if mode == Mode::Explain {
        Outcome::with_reasons(status, vec![reason()])
    } else {
        Outcome::new(status)
    }
}

/// `overlaps` compares schedules; `!=` compares scalar properties.
pub(crate) fn check_pairwise_properties(
    relation: Relation,
    property1: Property,
    property2: Property,
) -> RuleResult<()> {
    for property in [property1, property2] {
        let is_schedule = property.kind() == PropertyKind::Schedule;
        let ok = match relation {
            Relation::Overlaps => is_schedule,
            Relation::NotEqual => !is_schedule,
        };
        if !ok {
            return Err(RuleError::InvalidProperty {
                property,
                context: match relation {
                    Relation::Overlaps => "an 'overlaps' relation",
                    Relation::NotEqual => "a '!=' relation",
                },
            });
        }
    }
    if relation == Relation::NotEqual && property1.kind() != property2.kind() {
        return Err(RuleError::InvalidProperty {
            property: property2,
            context: "a '!=' relation between different property types",
        });
    }
    Ok(())
}

/// Boolean verdict on a manually assembled, complete selection.
pub fn evaluate(
    rule: &ExprNode,
    selection: &[EnrichedSection<'_>],
    registry: &CustomRuleRegistry,
) -> RuleResult<bool> {
    Evaluator::new(registry).check(rule, selection)
}

/// Partial-mode status of an in-progress selection.
pub fn evaluate_partial(
    rule: &ExprNode,
    selection: &[EnrichedSection<'_>],
    registry: &CustomRuleRegistry,
) -> RuleResult<Status> {
    Evaluator::new(registry).check_partial(rule, selection)
}

/// Verdict plus human-readable reasons, for diagnostics.
pub fn explain(
    rule: &ExprNode,
    selection: &[EnrichedSection<'_>],
    registry: &CustomRuleRegistry,
) -> RuleResult<Explanation> {
    Evaluator::new(registry).explain(rule, selection)
}

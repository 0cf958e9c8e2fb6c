use itertools::Itertools;
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::custom::CustomRuleRegistry;
use crate::data::{Assignment, Catalog, EnrichedSection, Section};
use crate::error::ScheduleError;
use crate::evaluator::{Evaluator, Status};
use crate::expr::ExprNode;
use crate::predicate::eval_predicate;
use crate::presets::{DEFAULT_MAX_CREDIT_LOAD, system_rules};
use crate::validate::validate_rule;

/// Decides which sections may take part in a run (seats, region, ...).
pub trait Eligibility {
    fn is_eligible(&self, section: &Section) -> bool;
}

impl<F: Fn(&Section) -> bool> Eligibility for F {
    fn is_eligible(&self, section: &Section) -> bool {
        self(section)
    }
}

/// Every section is eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSections;

impl Eligibility for AllSections {
    fn is_eligible(&self, _section: &Section) -> bool {
        true
    }
}

/// Sections with free seats for at least one of the student's destination codes.
#[derive(Debug, Clone, Default)]
pub struct DestinationFilter {
    dest_codes: HashSet<String>,
}

impl DestinationFilter {
    pub fn new<S: Into<String>>(dest_codes: impl IntoIterator<Item = S>) -> Self {
        Self {
            dest_codes: dest_codes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Eligibility for DestinationFilter {
    fn is_eligible(&self, section: &Section) -> bool {
        section
            .offerings
            .iter()
            .any(|o| o.vacancy_count > 0 && self.dest_codes.contains(&o.dest_code))
    }
}

/// Hooks called from inside the search.
pub trait SearchObserver {
    /// Fraction of the search space visited or pruned so far.
    fn on_progress(&mut self, _fraction: f64) {}

    /// Checked before every branch; returning true ends the search early.
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}

/// Adapts a progress callback.
pub struct ProgressFn<F>(pub F);

impl<F: FnMut(f64)> SearchObserver for ProgressFn<F> {
    fn on_progress(&mut self, fraction: f64) {
        (self.0)(fraction)
    }
}

/// Counters describing one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub eligible_sections: usize,
    pub viable_sections: usize,
    pub course_groups: usize,
    /// Product over groups of (group size + 1).
    pub total_space: f64,
    /// Complete assignments that reached final evaluation.
    pub visited: u64,
    /// Share of the space cut off by partial evaluation.
    pub pruned: f64,
    /// The search stopped before exhausting the space.
    pub truncated: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub assignments: Vec<Assignment>,
    pub stats: SearchStats,
}

/// Backtracking timetable generator.
#[derive(Debug, Clone)]
pub struct Solver<'r> {
    registry: &'r CustomRuleRegistry,
    max_credit_load: u32,
    max_solutions: Option<usize>,
    timeout: Option<Duration>,
}

struct Frame {
    depth: usize,
    next_choice: usize,
    picked: bool,
}

impl<'r> Solver<'r> {
    pub fn new(registry: &'r CustomRuleRegistry) -> Self {
        Self {
            registry,
            max_credit_load: DEFAULT_MAX_CREDIT_LOAD,
            max_solutions: None,
            timeout: None,
        }
    }

    pub fn with_max_credit_load(mut self, max: u32) -> Self {
        self.max_credit_load = max;
        self
    }

    /// Stops once this many timetables have been found.
    pub fn with_max_solutions(mut self, max: Option<usize>) -> Self {
        self.max_solutions = max;
        self
    }

    /// Stops after this much wall-clock time.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enumerates every timetable of eligible sections that satisfies the
    /// system rules and `rules`.
    ///
    /// An unsatisfiable rule set yields no assignments; malformed rules and
    /// inconsistent catalogs are errors.
    pub fn generate(
        &self,
        catalog: &Catalog,
        rules: &[ExprNode],
        eligibility: &dyn Eligibility,
        observer: &mut dyn SearchObserver,
    ) -> Result<SearchOutcome, ScheduleError> {
        let start_time = Instant::now();
        info!(
            "Starting timetable generation with {} courses and {} user rules...",
            catalog.len(),
            rules.len()
        );
        catalog.validate()?;

        let mut all_rules = system_rules(self.max_credit_load);
        all_rules.extend(rules.iter().cloned());
        let root = ExprNode::and(all_rules);
        validate_rule(&root, self.registry)?;

        let mut stats = SearchStats::default();
        let total_sections = catalog.sections().count();
        let eligible: Vec<EnrichedSection<'_>> = catalog
            .sections()
            .filter(|s| eligibility.is_eligible(s))
            .map(|s| catalog.enrich(s))
            .collect::<Result<_, _>>()?;
        stats.eligible_sections = eligible.len();
        info!(
            "Initial filter: {} sections -> {} eligible sections.",
            total_sections,
            eligible.len()
        );

        // pre-filter with single-section rules
        let unary = extract_unary_predicates(&root);
        let mut viable = Vec::with_capacity(eligible.len());
        for section in eligible {
            let mut keep = true;
            for predicate in &unary {
                if !eval_predicate(predicate, &section)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                viable.push(section);
            } else {
                trace!("Filtering out {} by a unary rule", section.key());
            }
        }
        stats.viable_sections = viable.len();
        info!(
            "Unary filter ({} predicates): {} -> {} sections.",
            unary.len(),
            stats.eligible_sections,
            viable.len()
        );

        // one group per course, most constrained first
        let groups: Vec<Vec<EnrichedSection<'_>>> = viable
            .into_iter()
            .into_group_map_by(|s| s.course_code())
            .into_iter()
            .sorted_by(|(a_code, a), (b_code, b)| a.len().cmp(&b.len()).then(a_code.cmp(b_code)))
            .map(|(_, group)| group)
            .collect();
        stats.course_groups = groups.len();

        // remaining[d] = size of the subtree below a branch at depth d
        let mut remaining = vec![1.0_f64; groups.len() + 1];
        for d in (0..groups.len()).rev() {
            remaining[d] = remaining[d + 1] * (groups[d].len() as f64 + 1.0);
        }
        stats.total_space = remaining[0];
        info!(
            "Starting backtracking search over {} course groups. Max potential combinations: ~{:.2e}.",
            groups.len(),
            stats.total_space
        );

        let mut evaluator = Evaluator::new(self.registry);
        let mut assignments = Vec::new();
        let mut selection: Vec<EnrichedSection<'_>> = Vec::with_capacity(groups.len());
        let mut stack = vec![Frame {
            depth: 0,
            next_choice: 0,
            picked: false,
        }];
        let deadline = self.timeout.map(|t| start_time + t);

        while let Some(frame) = stack.last_mut() {
            let depth = frame.depth;

            if depth == groups.len() {
                stats.visited += 1;
                if !selection.is_empty() && evaluator.check(&root, &selection)? {
                    let assignment = Assignment::from_selection(&selection);
                    debug!("Solution found: {assignment}");
                    assignments.push(assignment);
                }
                observer.on_progress(explored(&stats));
                pop_frame(&mut stack, &mut selection);
                continue;
            }

            let group = &groups[depth];
            if frame.next_choice > group.len() {
                pop_frame(&mut stack, &mut selection);
                continue;
            }
            let choice = frame.next_choice;
            frame.next_choice += 1;

            let capped = self.max_solutions.is_some_and(|max| assignments.len() >= max);
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if capped || expired || observer.should_stop() {
                info!(
                    "Stopping search early (cap reached: {capped}, timed out: {expired})."
                );
                stats.truncated = true;
                break;
            }

            // choice 0 skips the course, choice i picks section i - 1
            if choice == 0 {
                stack.push(Frame {
                    depth: depth + 1,
                    next_choice: 0,
                    picked: false,
                });
                continue;
            }

            selection.push(group[choice - 1]);
            match evaluator.check_partial(&root, &selection)? {
                Status::Violated => {
                    trace!(
                        "Pruned {} at depth {depth}, skipping ~{:.2e} combinations.",
                        group[choice - 1].key(),
                        remaining[depth + 1]
                    );
                    selection.pop();
                    stats.pruned += remaining[depth + 1];
                    observer.on_progress(explored(&stats));
                }
                status => {
                    trace!(
                        "Added {} at depth {depth}: {status:?}.",
                        group[choice - 1].key()
                    );
                    stack.push(Frame {
                        depth: depth + 1,
                        next_choice: 0,
                        picked: true,
                    });
                }
            }
        }

        if !stats.truncated {
            observer.on_progress(1.0);
        }
        stats.elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Search complete in {:.2?}. Found {} valid timetable(s) after {} final checks.",
            start_time.elapsed(),
            assignments.len(),
            stats.visited
        );
        if assignments.is_empty() {
            warn!(
                "No timetable found. Common reasons: no eligible sections for the destination \
                 codes, over-strict rules filtering out every section, or conflicting schedules."
            );
        }

        Ok(SearchOutcome { assignments, stats })
    }
}

fn pop_frame(stack: &mut Vec<Frame>, selection: &mut Vec<EnrichedSection<'_>>) {
    if let Some(frame) = stack.pop() {
        if frame.picked {
            selection.pop();
        }
    }
}

fn explored(stats: &SearchStats) -> f64 {
    if stats.total_space > 0.0 {
        ((stats.visited as f64 + stats.pruned) / stats.total_space).min(1.0)
    } else {
        1.0
    }
}

/// Collects the predicates of `all` nodes reachable from the root through
/// `and` nodes only. Each must hold for every selected section, so they can
/// discard sections before the search starts.
pub fn extract_unary_predicates(node: &ExprNode) -> Vec<&ExprNode> {
    let mut predicates = Vec::new();
    let mut pending = vec![node];
    while let Some(n) = pending.pop() {
        match n {
            ExprNode::All(predicate) => predicates.push(predicate.as_ref()),
            ExprNode::And(children) => pending.extend(children.iter().rev()),
            _ => {}
        }
    }
    predicates
}

/// Runs a search with the built-in custom rules and default limits.
pub fn generate(
    catalog: &Catalog,
    rules: &[ExprNode],
    eligibility: &dyn Eligibility,
    on_progress: Option<&mut dyn FnMut(f64)>,
) -> Result<Vec<Assignment>, ScheduleError> {
    let registry = CustomRuleRegistry::with_builtins();
    let solver = Solver::new(&registry);
    let outcome = match on_progress {
        Some(callback) => solver.generate(catalog, rules, eligibility, &mut ProgressFn(callback))?,
        None => solver.generate(catalog, rules, eligibility, &mut NoopObserver)?,
    };
    Ok(outcome.assignments)
}

mod common;

use std::collections::BTreeSet;

use common::{block, course, section};
use itertools::Itertools;
use proptest::prelude::*;
use timetable_solver::presets;
use timetable_solver::{
    AllSections, Catalog, CompareOp, CustomRuleRegistry, EnrichedSection, Evaluator, ExprNode,
    Property, Relation, Section, SectionKey, Status, Weekday, evaluate, generate,
};

fn with_hours(mut section: Section, distance: u32, shf: u32) -> Section {
    section.distance_hours = distance;
    section.shf_hours = shf;
    section
}

fn catalog() -> Catalog {
    let mut physics = course(
        "PH101",
        6,
        vec![
            with_hours(
                section("PH101", "T1", "Dr. A", vec![block(Weekday::Monday, 10, 12)]),
                2,
                4,
            ),
            section("PH101", "T2", "Dr. C", vec![block(Weekday::Friday, 8, 10)]),
        ],
    );
    physics.should_have_prerequisites = true;
    physics.bidir_co_requisites = vec!["MA101".to_string()];

    let cs_t2 = section(
        "CS101",
        "T2",
        "Dr. B",
        vec![block(Weekday::Tuesday, 8, 10), block(Weekday::Thursday, 8, 10)],
    );
    Catalog::from_courses(vec![
        course(
            "CS101",
            4,
            vec![
                with_hours(
                    section("CS101", "T1", "Dr. A", vec![block(Weekday::Monday, 8, 10)]),
                    4,
                    0,
                ),
                with_hours(cs_t2, 0, 2),
            ],
        ),
        course(
            "MA101",
            4,
            vec![section("MA101", "T1", "Dr. B", vec![block(Weekday::Monday, 11, 13)])],
        ),
        physics,
        course(
            "EN101",
            2,
            vec![with_hours(
                section("EN101", "T1", "Dr. C", vec![block(Weekday::Tuesday, 14, 16)]),
                2,
                2,
            )],
        ),
    ])
}

fn compare_op() -> impl Strategy<Value = CompareOp> {
    prop::sample::select(vec![
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Lt,
        CompareOp::Ge,
        CompareOp::Le,
    ])
}

fn number_property() -> impl Strategy<Value = Property> {
    prop::sample::select(vec![
        Property::NumCredits,
        Property::DistanceHours,
        Property::ShfHours,
    ])
}

fn text_property() -> impl Strategy<Value = Property> {
    prop::sample::select(vec![
        Property::CourseCode,
        Property::ClassCode,
        Property::ProfessorName,
    ])
}

fn arb_predicate() -> impl Strategy<Value = ExprNode> {
    let leaf = prop_oneof![
        prop::sample::select(vec!["CS101", "MA101", "PH101", "EN101"])
            .prop_map(|c| ExprNode::eq(Property::CourseCode, c)),
        prop::sample::select(vec!["Dr. A", "Dr. B", "Dr. C"])
            .prop_map(|p| ExprNode::ne(Property::ProfessorName, p)),
        (compare_op(), number_property(), 0u32..=6)
            .prop_map(|(op, property, n)| ExprNode::compare(op, property, n)),
        any::<bool>().prop_map(|b| ExprNode::eq(Property::ShouldHavePrerequisites, b)),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(ExprNode::and),
            prop::collection::vec(inner.clone(), 0..3).prop_map(ExprNode::or),
            inner.prop_map(ExprNode::not),
        ]
    })
}

/// `!=` and `overlaps` over every property pairing the relation accepts,
/// optionally restricted to sections matching a predicate.
fn arb_pairwise() -> impl Strategy<Value = ExprNode> {
    let same_kind = prop_oneof![
        (number_property(), number_property()),
        (text_property(), text_property()),
    ];
    let not_equal = (same_kind, any::<bool>()).prop_map(|((p1, p2), distinct)| {
        ExprNode::Pairwise {
            relation: Relation::NotEqual,
            property1: p1,
            property2: distinct.then_some(p2),
            predicate: None,
        }
    });
    let relation = prop_oneof![not_equal, Just(presets::no_overlaps())];
    (relation, prop::option::of(arb_predicate())).prop_map(|(node, filter)| match node {
        ExprNode::Pairwise {
            relation,
            property1,
            property2,
            ..
        } => ExprNode::Pairwise {
            relation,
            property1,
            property2,
            predicate: filter.map(Box::new),
        },
        other => other,
    })
}

fn arb_rule() -> impl Strategy<Value = ExprNode> {
    let leaf = prop_oneof![
        arb_predicate().prop_map(ExprNode::some),
        arb_predicate().prop_map(ExprNode::all),
        (number_property(), compare_op(), 0u32..20)
            .prop_map(|(property, op, n)| ExprNode::sum(property, op, f64::from(n))),
        (number_property(), compare_op(), 0u32..12, arb_predicate()).prop_map(
            |(property, op, n, filter)| ExprNode::sum_where(property, op, f64::from(n), filter)
        ),
        (arb_predicate(), compare_op(), 0u32..4)
            .prop_map(|(p, op, n)| ExprNode::count(p, op, f64::from(n))),
        arb_pairwise(),
        Just(presets::course_unique()),
        Just(presets::no_gaps_by_day()),
        Just(presets::require_co_requisites()),
        Just(presets::forbid_classes_on_days(&[Weekday::Friday])),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(ExprNode::and),
            prop::collection::vec(inner.clone(), 0..4).prop_map(ExprNode::or),
            inner.prop_map(ExprNode::not),
        ]
    })
}

/// Indices into the catalog's section list, in pick order.
fn arb_order() -> impl Strategy<Value = Vec<usize>> {
    prop::sample::subsequence((0..6).collect::<Vec<usize>>(), 0..=6).prop_shuffle()
}

fn enriched(catalog: &Catalog) -> Vec<EnrichedSection<'_>> {
    catalog
        .sections()
        .map(|s| catalog.enrich(s).unwrap())
        .collect()
}

/// Every non-empty pick of at most one section per course that `rule`
/// accepts together with the system rules.
fn enumerate_accepted(catalog: &Catalog, rule: &ExprNode) -> BTreeSet<Vec<SectionKey>> {
    let registry = CustomRuleRegistry::with_builtins();
    let mut rules = presets::system_rules(presets::DEFAULT_MAX_CREDIT_LOAD);
    rules.push(rule.clone());
    let root = ExprNode::and(rules);

    let mut accepted = BTreeSet::new();
    let choices = catalog
        .courses()
        .map(|c| std::iter::once(None).chain(c.sections.iter().map(Some)).collect_vec());
    for picks in choices.multi_cartesian_product() {
        let selection: Vec<_> = picks
            .into_iter()
            .flatten()
            .map(|s| catalog.enrich(s).unwrap())
            .collect();
        if !selection.is_empty() && evaluate(&root, &selection, &registry).unwrap() {
            accepted.insert(selection.iter().map(|s| s.key()).sorted().collect());
        }
    }
    accepted
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A prefix judged violated never completes to an accepted selection,
    /// and a prefix judged satisfied never completes to a rejected one.
    #[test]
    fn partial_verdicts_agree_with_final(rule in arb_rule(), order in arb_order()) {
        let catalog = catalog();
        let sections = enriched(&catalog);
        let registry = CustomRuleRegistry::with_builtins();
        let mut evaluator = Evaluator::new(&registry);

        let full: Vec<_> = order.iter().map(|&i| sections[i]).collect();
        let accepted = evaluator.check(&rule, &full).unwrap();

        for len in 0..=full.len() {
            match evaluator.check_partial(&rule, &full[..len]).unwrap() {
                Status::Violated => {
                    prop_assert!(!accepted, "prefix of {} violated, full accepted", len);
                }
                Status::Satisfied => {
                    prop_assert!(accepted, "prefix of {} satisfied, full rejected", len);
                }
                Status::Pending => {}
            }
        }
    }

    /// Once decided, a partial status never changes as sections are added.
    #[test]
    fn decided_statuses_are_monotone(rule in arb_rule(), order in arb_order()) {
        let catalog = catalog();
        let sections = enriched(&catalog);
        let registry = CustomRuleRegistry::with_builtins();
        let mut evaluator = Evaluator::new(&registry);

        let full: Vec<_> = order.iter().map(|&i| sections[i]).collect();
        let mut decided = None;
        for len in 0..=full.len() {
            let status = evaluator.check_partial(&rule, &full[..len]).unwrap();
            match decided {
                Some(previous) => prop_assert_eq!(status, previous),
                None if status != Status::Pending => decided = Some(status),
                None => {}
            }
        }
    }

    #[test]
    fn quantifiers_are_monotone(predicate in arb_predicate(), order in arb_order()) {
        let catalog = catalog();
        let sections = enriched(&catalog);
        let registry = CustomRuleRegistry::with_builtins();
        let mut evaluator = Evaluator::new(&registry);
        let some = ExprNode::some(predicate.clone());
        let all = ExprNode::all(predicate);

        let full: Vec<_> = order.iter().map(|&i| sections[i]).collect();
        let mut some_satisfied = false;
        let mut all_violated = false;
        for len in 0..=full.len() {
            let prefix = &full[..len];
            let some_status = evaluator.check_partial(&some, prefix).unwrap();
            let all_status = evaluator.check_partial(&all, prefix).unwrap();
            if some_satisfied {
                prop_assert_eq!(some_status, Status::Satisfied);
            }
            if all_violated {
                prop_assert_eq!(all_status, Status::Violated);
            }
            some_satisfied = some_status == Status::Satisfied;
            all_violated = all_status == Status::Violated;
        }
    }

    #[test]
    fn explain_is_idempotent(rule in arb_rule(), order in arb_order()) {
        let catalog = catalog();
        let sections = enriched(&catalog);
        let registry = CustomRuleRegistry::with_builtins();
        let selection: Vec<_> = order.iter().map(|&i| sections[i]).collect();

        let first = Evaluator::new(&registry).explain(&rule, &selection).unwrap();
        let second = Evaluator::new(&registry).explain(&rule, &selection).unwrap();
        let verdict = Evaluator::new(&registry).check(&rule, &selection).unwrap();
        prop_assert_eq!(first.status, second.status);
        prop_assert_eq!(first.status == Status::Satisfied, verdict);
    }

    /// Pruning and the unary pre-filter never lose or invent a timetable.
    #[test]
    fn search_matches_exhaustive_enumeration(rule in arb_rule()) {
        let catalog = catalog();
        let expected = enumerate_accepted(&catalog, &rule);

        let solutions = generate(&catalog, &[rule], &AllSections, None).unwrap();
        let found: BTreeSet<Vec<SectionKey>> = solutions
            .iter()
            .map(|a| a.keys().into_iter().sorted().collect())
            .collect();
        prop_assert_eq!(found.len(), solutions.len(), "duplicate timetables");
        prop_assert_eq!(found, expected);
    }
}

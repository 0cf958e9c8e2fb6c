mod common;

use common::{block, course, section};
use std::collections::HashSet;
use timetable_solver::presets;
use timetable_solver::{AllSections, Catalog, CompareOp, ExprNode, Property, Weekday, generate};

#[test]
fn test_two_compatible_courses() {
    let catalog = Catalog::from_courses(vec![
        course(
            "CS101",
            4,
            vec![section("CS101", "T1", "Dr. Smith", vec![block(Weekday::Monday, 8, 10)])],
        ),
        course(
            "MA101",
            4,
            vec![section("MA101", "T1", "Dr. Who", vec![block(Weekday::Tuesday, 8, 10)])],
        ),
    ]);

    let solutions = generate(&catalog, &[], &AllSections, None).unwrap();
    let both: Vec<_> = solutions.iter().filter(|a| a.len() == 2).collect();
    assert_eq!(both.len(), 1);
    assert!(both[0].contains("CS101", "T1"));
    assert!(both[0].contains("MA101", "T1"));
    assert_eq!(both[0].total_credits, 8);

    let required = vec![presets::minimum_courses_set(&["CS101", "MA101"])];
    let solutions = generate(&catalog, &required, &AllSections, None).unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].len(), 2);
}

#[test]
fn test_overlapping_sections_never_together() {
    let catalog = Catalog::from_courses(vec![
        course(
            "CS101",
            4,
            vec![section("CS101", "T1", "Dr. Smith", vec![block(Weekday::Monday, 10, 12)])],
        ),
        course(
            "MA101",
            4,
            vec![section("MA101", "T1", "Dr. Who", vec![block(Weekday::Monday, 11, 13)])],
        ),
    ]);

    let solutions = generate(&catalog, &[], &AllSections, None).unwrap();
    assert!(!solutions.is_empty());
    assert!(solutions
        .iter()
        .all(|a| !(a.contains("CS101", "T1") && a.contains("MA101", "T1"))));
}

#[test]
fn test_professor_filter_keeps_only_matching_section() {
    let catalog = Catalog::from_courses(vec![course(
        "CS101",
        4,
        vec![
            section("CS101", "T1", "Prof X", vec![block(Weekday::Monday, 8, 10)]),
            section("CS101", "T2", "Prof Y", vec![block(Weekday::Tuesday, 8, 10)]),
        ],
    )]);
    let rules = vec![ExprNode::all(ExprNode::eq(Property::ProfessorName, "Prof X"))];

    let solutions = generate(&catalog, &rules, &AllSections, None).unwrap();
    assert_eq!(solutions.len(), 1);
    for assignment in &solutions {
        for s in assignment.sections.iter().filter(|s| s.course_code == "CS101") {
            assert_eq!(s.professor_name, "Prof X");
        }
    }
}

#[test]
fn test_credit_ceiling() {
    let catalog = Catalog::from_courses(vec![
        course("A", 4, vec![section("A", "T1", "P", vec![block(Weekday::Monday, 8, 10)])]),
        course("B", 4, vec![section("B", "T1", "P", vec![block(Weekday::Tuesday, 8, 10)])]),
        course("C", 6, vec![section("C", "T1", "P", vec![block(Weekday::Wednesday, 8, 10)])]),
    ]);
    let rules = vec![ExprNode::sum(Property::NumCredits, CompareOp::Le, 10.0)];

    let solutions = generate(&catalog, &rules, &AllSections, None).unwrap();
    assert!(solutions.iter().all(|a| a.total_credits <= 10));
    assert!(solutions.iter().all(|a| a.len() <= 2));
    // 3 singles + A+B, A+C, B+C
    assert_eq!(solutions.len(), 6);
}

#[test]
fn test_empty_course_whitelist_matches_no_rules() {
    let unrestricted = generate(&busy_catalog(), &[], &AllSections, None).unwrap();
    let rules = vec![presets::available_courses::<&str>(&[])];
    let whitelisted = generate(&busy_catalog(), &rules, &AllSections, None).unwrap();
    assert!(!unrestricted.is_empty());
    assert_eq!(whitelisted, unrestricted);

    let rules = vec![presets::available_courses(&["MA101"])];
    let only_math = generate(&busy_catalog(), &rules, &AllSections, None).unwrap();
    assert_eq!(only_math.len(), 3);
    assert!(only_math.iter().all(|a| a.sections.iter().all(|s| s.course_code == "MA101")));
}

fn busy_catalog() -> Catalog {
    let days = [Weekday::Monday, Weekday::Tuesday, Weekday::Wednesday];
    let courses = ["CS101", "CS102", "MA101", "PH101"]
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let sections = (0..3)
                .map(|j| {
                    let day = days[(i + j) % days.len()];
                    let start = 8 + ((i * 2 + j) % 4) as u8;
                    let schedule = vec![block(day, start, start + 2)];
                    section(code, &format!("T{j}"), &format!("Prof {j}"), schedule)
                })
                .collect();
            course(code, 4 + i as u32, sections)
        })
        .collect::<Vec<_>>();
    Catalog::from_courses(courses)
}

#[test]
fn test_at_most_one_section_per_course() {
    let solutions = generate(&busy_catalog(), &[], &AllSections, None).unwrap();
    assert!(!solutions.is_empty());
    for assignment in &solutions {
        let codes: HashSet<_> = assignment.sections.iter().map(|s| &s.course_code).collect();
        assert_eq!(codes.len(), assignment.len());
    }
}

#[test]
fn test_no_overlap_in_any_solution() {
    let solutions = generate(&busy_catalog(), &[], &AllSections, None).unwrap();
    for assignment in &solutions {
        for (i, a) in assignment.sections.iter().enumerate() {
            for b in &assignment.sections[i + 1..] {
                assert!(!a.overlaps(b), "{} overlaps {}", a.key(), b.key());
            }
        }
    }
}

#[test]
fn test_unknown_course_in_catalog_is_a_data_error() {
    let stray = course("CS101", 4, vec![section("XX999", "T1", "P", vec![])]);
    let catalog = Catalog::from_courses(vec![stray]);
    let err = generate(&catalog, &[], &AllSections, None).unwrap_err();
    assert_eq!(err.kind(), "invalid_data");
}

#[test]
fn test_progress_callback_reports_completion() {
    let mut last = 0.0;
    let on_progress: &mut dyn FnMut(f64) = &mut |fraction| last = fraction;
    generate(&busy_catalog(), &[], &AllSections, Some(on_progress)).unwrap();
    assert_eq!(last, 1.0);
}

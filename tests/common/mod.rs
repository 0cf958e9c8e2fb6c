#![allow(dead_code)]

use timetable_solver::{Course, Offering, Section, TimeBlock, Weekday};

pub fn block(day: Weekday, start: u8, end: u8) -> TimeBlock {
    TimeBlock::new(day, start, end)
}

pub fn section(course: &str, class: &str, professor: &str, schedule: Vec<TimeBlock>) -> Section {
    Section {
        class_code: class.to_string(),
        course_code: course.to_string(),
        professor_name: professor.to_string(),
        distance_hours: 0,
        shf_hours: 0,
        schedule,
        offerings: vec![Offering {
            dest_code: "CIC".to_string(),
            vacancy_count: 10,
        }],
    }
}

pub fn course(code: &str, credits: u32, sections: Vec<Section>) -> Course {
    Course {
        code: code.to_string(),
        name: format!("Course {code}"),
        num_credits: credits,
        should_have_prerequisites: false,
        bidir_co_requisites: vec![],
        unidir_co_requisites: vec![],
        sections,
    }
}

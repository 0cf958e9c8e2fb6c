use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{DataError, DataResult};
use crate::expr::{Property, PropertyValue};

// Type aliases for clarity
pub type CourseCode = String;
pub type ClassCode = String;
pub type Hour = u8;

/// Day of the week a time block falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    #[serde(alias = "segunda")]
    Monday,
    #[serde(alias = "terça")]
    Tuesday,
    #[serde(alias = "quarta")]
    Wednesday,
    #[serde(alias = "quinta")]
    Thursday,
    #[serde(alias = "sexta")]
    Friday,
    #[serde(alias = "sábado")]
    Saturday,
    #[serde(alias = "domingo")]
    Sunday,
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        };
        f.write_str(name)
    }
}

/// One weekly meeting: `[start_hour, end_hour)` on `day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub day: Weekday,
    pub start_hour: Hour,
    pub end_hour: Hour,
}

impl TimeBlock {
    pub fn new(day: Weekday, start_hour: Hour, end_hour: Hour) -> Self {
        Self {
            day,
            start_hour,
            end_hour,
        }
    }

    /// Half-open interval intersection on the same weekday.
    pub fn overlaps(&self, other: &TimeBlock) -> bool {
        self.day == other.day
            && self.start_hour < other.end_hour
            && other.start_hour < self.end_hour
    }

    fn is_valid(&self) -> bool {
        self.start_hour < self.end_hour && self.end_hour <= 24
    }
}

/// Seats of a section reserved for one region/destination code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offering {
    pub dest_code: String,
    pub vacancy_count: u32,
}

/// A schedulable class section of a course.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub class_code: ClassCode,
    pub course_code: CourseCode,
    #[serde(default)]
    pub professor_name: String,
    #[serde(default)]
    pub distance_hours: u32,
    #[serde(default, rename = "SHFHours")]
    pub shf_hours: u32,
    #[serde(default)]
    pub schedule: Vec<TimeBlock>,
    #[serde(default)]
    pub offerings: Vec<Offering>,
}

impl Section {
    pub fn key(&self) -> SectionKey {
        SectionKey::new(self.course_code.clone(), self.class_code.clone())
    }

    /// True if any pair of blocks from the two sections intersect.
    pub fn overlaps(&self, other: &Section) -> bool {
        self.schedule
            .iter()
            .any(|a| other.schedule.iter().any(|b| a.overlaps(b)))
    }
}

/// A course and the sections it is offered in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub code: CourseCode,
    #[serde(default)]
    pub name: String,
    pub num_credits: u32,
    #[serde(default, rename = "shouldHavePreRequisites")]
    pub should_have_prerequisites: bool,
    #[serde(default, rename = "bidirCoRequisites")]
    pub bidir_co_requisites: Vec<CourseCode>,
    #[serde(default, rename = "unidirCoRequisites")]
    pub unidir_co_requisites: Vec<CourseCode>,
    #[serde(default, alias = "classes")]
    pub sections: Vec<Section>,
}

/// Identity of a section: course code plus class code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionKey {
    pub course_code: CourseCode,
    pub class_code: ClassCode,
}

impl SectionKey {
    pub fn new(course_code: impl Into<CourseCode>, class_code: impl Into<ClassCode>) -> Self {
        Self {
            course_code: course_code.into(),
            class_code: class_code.into(),
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.course_code, self.class_code)
    }
}

/// All courses of one generation run, keyed by code.
///
/// Serialized as a plain list of courses; a list repeating a course code is
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "Vec<Course>", into = "Vec<Course>")]
pub struct Catalog {
    courses: BTreeMap<CourseCode, Course>,
}

impl TryFrom<Vec<Course>> for Catalog {
    type Error = DataError;

    fn try_from(courses: Vec<Course>) -> DataResult<Self> {
        let mut catalog = Self::new();
        for course in courses {
            if catalog.courses.contains_key(&course.code) {
                return Err(DataError::DuplicateCourse(course.code));
            }
            catalog.insert(course);
        }
        Ok(catalog)
    }
}

impl From<Catalog> for Vec<Course> {
    fn from(catalog: Catalog) -> Self {
        catalog.courses.into_values().collect()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later duplicates of a course code replace earlier ones; use
    /// `Catalog::try_from` to reject them instead.
    pub fn from_courses(courses: impl IntoIterator<Item = Course>) -> Self {
        let mut catalog = Self::new();
        for course in courses {
            catalog.insert(course);
        }
        catalog
    }

    /// Adds a course, returning the one it replaced.
    pub fn insert(&mut self, course: Course) -> Option<Course> {
        self.courses.insert(course.code.clone(), course)
    }

    pub fn course(&self, code: &str) -> Option<&Course> {
        self.courses.get(code)
    }

    pub fn courses(&self) -> impl Iterator<Item = &Course> {
        self.courses.values()
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.courses.values().flat_map(|c| c.sections.iter())
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Finds a section by identity.
    pub fn section(&self, key: &SectionKey) -> Option<&Section> {
        self.courses
            .get(&key.course_code)?
            .sections
            .iter()
            .find(|s| s.class_code == key.class_code)
    }

    /// Checks referential integrity of the whole catalog.
    ///
    /// Stops at the first problem found.
    pub fn validate(&self) -> DataResult<()> {
        let mut seen = HashSet::new();
        for (code, course) in &self.courses {
            if course.num_credits == 0 {
                return Err(DataError::ZeroCredits(code.clone()));
            }
            for section in &course.sections {
                let key = section.key();
                if section.course_code != *code {
                    if self.courses.contains_key(&section.course_code) {
                        return Err(DataError::MisplacedSection {
                            section: key,
                            owner: code.clone(),
                        });
                    }
                    return Err(DataError::UnknownCourse {
                        course_code: section.course_code.clone(),
                        section: key,
                    });
                }
                if let Some(block) = section.schedule.iter().find(|b| !b.is_valid()) {
                    return Err(DataError::InvalidTimeBlock {
                        section: key,
                        start: block.start_hour,
                        end: block.end_hour,
                    });
                }
                if !seen.insert(key.clone()) {
                    return Err(DataError::DuplicateSection(key));
                }
            }
        }
        Ok(())
    }

    /// Builds the evaluation view of `section` from its course's attributes.
    pub fn enrich<'a>(&'a self, section: &'a Section) -> DataResult<EnrichedSection<'a>> {
        let course = self
            .courses
            .get(&section.course_code)
            .ok_or_else(|| DataError::UnknownCourse {
                section: section.key(),
                course_code: section.course_code.clone(),
            })?;
        Ok(EnrichedSection { section, course })
    }

    /// Looks up and enriches a list of sections, e.g. a manually assembled timetable.
    pub fn enrich_keys<'a>(&'a self, keys: &[SectionKey]) -> DataResult<Vec<EnrichedSection<'a>>> {
        keys.iter()
            .map(|key| {
                let section = self
                    .section(key)
                    .ok_or_else(|| DataError::UnknownSection(key.clone()))?;
                self.enrich(section)
            })
            .collect()
    }
}

/// A section seen together with its course's attributes.
///
/// Borrowed from the catalog and rebuilt for every evaluation request.
#[derive(Debug, Clone, Copy)]
pub struct EnrichedSection<'a> {
    pub section: &'a Section,
    pub course: &'a Course,
}

impl<'a> EnrichedSection<'a> {
    pub fn course_code(&self) -> &'a str {
        &self.section.course_code
    }

    pub fn class_code(&self) -> &'a str {
        &self.section.class_code
    }

    pub fn credits(&self) -> u32 {
        self.course.num_credits
    }

    pub fn schedule(&self) -> &'a [TimeBlock] {
        &self.section.schedule
    }

    /// Borrowed identity, cheap enough for hot-path cache keys.
    pub fn id(&self) -> (&'a str, &'a str) {
        (&self.section.course_code, &self.section.class_code)
    }

    pub fn key(&self) -> SectionKey {
        self.section.key()
    }

    /// Typed access to one property of the merged view.
    pub fn value(&self, property: Property) -> PropertyValue<'a> {
        match property {
            Property::CourseCode => PropertyValue::Text(&self.section.course_code),
            Property::ClassCode => PropertyValue::Text(&self.section.class_code),
            Property::ProfessorName => PropertyValue::Text(&self.section.professor_name),
            Property::NumCredits => PropertyValue::Number(f64::from(self.course.num_credits)),
            Property::DistanceHours => {
                PropertyValue::Number(f64::from(self.section.distance_hours))
            }
            Property::ShfHours => PropertyValue::Number(f64::from(self.section.shf_hours)),
            Property::ShouldHavePrerequisites => {
                PropertyValue::Flag(self.course.should_have_prerequisites)
            }
            Property::Schedule => PropertyValue::Schedule(&self.section.schedule),
        }
    }
}

/// A timetable: at most one section per course, in pick order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub sections: Vec<Section>,
    pub total_credits: u32,
}

impl Assignment {
    pub fn from_selection(selection: &[EnrichedSection<'_>]) -> Self {
        Self {
            sections: selection.iter().map(|s| s.section.clone()).collect(),
            total_credits: selection.iter().map(|s| s.credits()).sum(),
        }
    }

    pub fn keys(&self) -> Vec<SectionKey> {
        self.sections.iter().map(Section::key).collect()
    }

    pub fn contains(&self, course_code: &str, class_code: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.course_code == course_code && s.class_code == class_code)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.sections.iter().map(|s| s.key().to_string()).collect();
        write!(f, "[{}] ({} credits)", keys.join(", "), self.total_credits)
    }
}

pub mod config;
pub mod custom;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod predicate;
pub mod presets;
pub mod server;
pub mod solver;
pub mod validate;

pub use custom::{CustomRule, CustomRuleRegistry};
pub use data::{
    Assignment, Catalog, Course, EnrichedSection, Offering, Section, SectionKey, TimeBlock, Weekday,
};
pub use error::{DataError, RuleError, ScheduleError};
pub use evaluator::{
    Evaluator, Explanation, Mode, Outcome, Status, evaluate, evaluate_partial, explain,
};
pub use expr::{CompareOp, ExprNode, Property, Relation, Value};
pub use predicate::eval_predicate;
pub use solver::{
    AllSections, DestinationFilter, Eligibility, NoopObserver, ProgressFn, SearchObserver,
    SearchOutcome, SearchStats, Solver, generate,
};
pub use validate::{parse_rule, validate_rule};

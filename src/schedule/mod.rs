//! Which days are workdays and what the working window of a day looks like.
//!
//! [store::ScheduleStore] owns the persisted configuration and validates every write;
//! [model::MonthSchedule] is the resolved, immutable view a computation pass works with.

pub mod model;
pub mod store;

pub use model::{DaySchedule, MonthSchedule, ScheduleTemplate, TimeWindow, WorkHours};
pub use store::{ScheduleConfig, ScheduleStore};

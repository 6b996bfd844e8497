//! ktv-pd (Program Director) library
//!
//! Builds the daily grid of a kids' linear TV channel from a content
//! catalog and tells viewers what is on air at any instant.
//!
//! **Pieces:**
//! - [`rotation`]: episode rotation and per-show airtime history
//! - [`segment`]: bounded blocks and resume points for long-form content
//! - [`generator`]: the day and week schedulers
//! - [`resolver`]: wall clock to playhead
//! - [`recorder`] and [`tuner`]: what actually aired, written back to history
//! - [`api`]: HTTP and SSE surface over [`service::ChannelService`]

pub mod announcements;
pub mod api;
pub mod catalog;
pub mod config;
pub mod generator;
pub mod recorder;
pub mod resolver;
pub mod rotation;
pub mod schedule;
pub mod segment;
pub mod service;
pub mod tuner;

pub use catalog::{ContentCatalog, ContentItem, FileCatalog, StaticCatalog};
pub use config::ChannelConfig;
pub use generator::ScheduleGenerator;
pub use resolver::{resolve, resolve_at, PlayheadState};
pub use rotation::RotationTracker;
pub use schedule::{DaySchedule, ScheduledProgram, WeekSchedule};
pub use segment::SegmentPlanner;
pub use service::ChannelService;

#![warn(missing_docs)]

//! Batch STEP to STL conversion for the glasses hardware parts.
//!
//! A task table names each STEP input and a selection rule that decides
//! which solids go to which STL file. The [`Converter`] runs the table:
//!
//! ```text
//! STEP file ─► StepDocument ─► select(rule) ─► tessellate ─► STL (+ repair)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stlforge::{ConvertConfig, Converter};
//!
//! let converter = Converter::new(ConvertConfig::default()).unwrap();
//! let report = converter.run().unwrap();
//! assert!(report.is_success());
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod repair;
pub mod selection;

pub use config::{default_tasks, ConvertConfig, OnError, Task};
pub use converter::{BatchReport, Converter, OutputReport, TaskFailure, TaskReport};
pub use error::{ConfigError, ConvertError, Result, SelectionError};
pub use repair::{RepairConfig, RepairError};
pub use selection::{select, Axis, Group, Rule, Selection};
pub use stlforge_kernel::{Deflection, StlFormat};

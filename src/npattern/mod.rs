//! The node-pattern matcher (spec.md §4.4, §4.5): a single-hop matcher
//! compiled from a textual pattern body plus the axis traversal it runs
//! over.

pub mod axis;
pub mod compile;
pub mod exec;

pub use axis::{Axis, AxisMask, AXIS_FUNCS_MAX};
pub use compile::{AttrPredicate, Hook, NPattern, Predicate, TypeFilter};
pub use exec::{enumerate, enumerate_positions, HasEvaluator};

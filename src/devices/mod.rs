//! device drivers compiled in the crate

pub mod generic;
pub mod din;
pub mod el41x2;
pub mod stepper;

use crate::registry::DeviceType;

/// device tables registered by [crate::registry::Registry::builtin], in order
pub const TABLES: &[&[DeviceType]] = &[
	din::TYPES,
	el41x2::TYPES,
	stepper::TYPES,
	];

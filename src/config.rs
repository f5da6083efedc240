/*!
	in-process configuration of masters and slaves

	These records are what a configuration loader produces. They are consumed once when masters and slaves are created, values that need runtime tuning are exported as pins instead.
*/

use crate::{
	clock::ClockConfig,
	sdo::InitCommand,
	devices::generic::GenericSync,
	};

/// default period of the slave state polling, in nanoseconds
pub const STATE_UPDATE_PERIOD: u64 = 1_000_000_000;

/// configuration of one master
#[derive(Clone, Debug)]
pub struct MasterConfig {
	/// index of the master in the fieldbus library
	pub index: u32,
	/// name used in pin names and logs
	pub name: String,
	/// period of the realtime task, in nanoseconds
	pub app_time_period: u32,
	/// number of cycles between two synchronizations of the reference clock to the master time
	pub sync_ref_cycles: u32,
	/// use the reference clock as time source and discipline the realtime task on it
	pub sync_to_ref_clock: bool,
	/// period of the slave state polling, in nanoseconds
	pub state_update_period: u64,
	/// enable the distributed clock phase lock of the realtime task
	pub clock: Option<ClockConfig>,
}
impl Default for MasterConfig {
	fn default() -> Self {
		Self {
			index: 0,
			name: String::from("0"),
			app_time_period: 1_000_000,
			sync_ref_cycles: 1,
			sync_to_ref_clock: false,
			state_update_period: STATE_UPDATE_PERIOD,
			clock: None,
		}
	}
}

/**
	distributed clock configuration of one slave

	`assign_activate` is the value of the slave's activation register (0x0980), usually `0x300` for sync0 or `0x700` for sync0 and sync1
*/
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DcConfig {
	pub assign_activate: u16,
	pub sync0_cycle: u32,
	pub sync0_shift: i32,
	pub sync1_cycle: u32,
	pub sync1_shift: i32,
}

/// process data watchdog configuration of one slave
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct WatchdogConfig {
	pub divider: u16,
	pub intervals: u16,
}

/// configuration of one slave
#[derive(Clone, Debug, Default)]
pub struct SlaveConfig {
	/// ring position on the bus
	pub position: u16,
	/// station alias, 0 when addressing by position only
	pub alias: u16,
	/// name used in pin names and logs
	pub name: String,
	/// name of the device type in the registry, `generic` for a fully configured layout
	pub kind: String,
	/// vendor id overriding the device type's, if not 0
	pub vendor: u32,
	/// product id overriding the device type's, if not 0
	pub product: u32,
	/// device-private flags overriding the device type's
	pub flags: Option<u64>,
	/// raw option values, parsed against the device type's schema
	pub modparams: Vec<(String, String)>,
	pub dc: Option<DcConfig>,
	pub watchdog: Option<WatchdogConfig>,
	/// mailbox commands, sent in order
	pub commands: Vec<InitCommand>,
	/// layout of a `generic` slave
	pub layout: Vec<GenericSync>,
}
impl SlaveConfig {
	pub fn new(position: u16, kind: &str, name: &str) -> Self {
		Self {
			position,
			kind: kind.into(),
			name: name.into(),
			.. Default::default()
		}
	}
	/// add a raw option value
	pub fn modparam(mut self, name: &str, value: &str) -> Self {
		self.modparams.push((name.into(), value.into()));
		self
	}
}

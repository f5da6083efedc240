/*!
	AL states of slaves, and the state records the cyclic engine publishes for masters and slaves.

	ETG.1000.6 table 9
*/

use core::{fmt, ops::BitOr};
use bilge::prelude::*;

/**
	state of the AL state machine of a slave

	the states follow `Init -> PreOperational -> SafeOperational -> Operational`, [Self::Bootstrap] being only transitional
*/
#[bitsize(4)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum AlState {
	/// transitional state when the slave is booting up
	Bootstrap = 3,
	/// registers only, no mailbox
	Init = 1,
	/// mailbox communication allowed, used for one-time configuration
	PreOperational = 2,
	/// inputs are exchanged, outputs are ignored by the slave
	SafeOperational = 4,
	/// realtime operations running
	Operational = 8,
}

/**
	gather the current operation states on several devices
	this struct does not provide any way to know which slave is in which state

	The bits match the ones reported by the fieldbus library: `0x01` init, `0x02` preop, `0x04` safeop, `0x08` op
*/
#[bitsize(4)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct AlMixedState {
	/// one slave at least is in [AlState::Init]
	pub init: bool,
	/// one slave at least is in [AlState::PreOperational]
	pub pre_operational: bool,
	/// one slave at least is in [AlState::SafeOperational]
	pub safe_operational: bool,
	/// one slave at least is in [AlState::Operational]
	pub operational: bool,
}

impl AlMixedState {
	/// build from raw state bits, bits above the 4 known states are ignored
	pub fn from_bits(bits: u8) -> Self {
		Self::from(u4::new(bits & 0xf))
	}
	pub fn bits(self) -> u8 {
		u4::from(self).value()
	}
	/// true when every slave is in [AlState::Operational] and nothing else
	pub fn all_operational(self) -> bool {
		self.bits() == u4::from(AlState::Operational).value()
	}
}
impl Default for AlMixedState {
	fn default() -> Self  {Self::from_bits(0)}
}
impl BitOr for AlMixedState {
	type Output = Self;
	fn bitor(self, other: Self) -> Self {
		Self::from_bits(self.bits() | other.bits())
	}
}

impl fmt::Display for AlMixedState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{{")?;
		for (active, mark) in [ (self.init(), "init"),
								(self.pre_operational(), "pre"),
								(self.safe_operational(), "safe"),
								(self.operational(), "op"),
								] {
			write!(f, " ")?;
			if active {
				write!(f, "{}", mark)?;
			} else {
				for _ in 0 .. mark.len() {write!(f, " ")?;}
			}
		}
		write!(f, "}}")?;
		Ok(())
	}
}

impl TryFrom<AlMixedState> for AlState {
	type Error = &'static str;
	fn try_from(state: AlMixedState) -> Result<Self, Self::Error> {
		Self::try_from(u4::from(state)).map_err(|_|  "cannot unwrap when not only 1 state in mix")
	}
}
impl From<AlState> for AlMixedState {
	fn from(state: AlState) -> Self {
		Self::from(u4::from(state))
	}
}

/// state of one slave as last reported by the bus
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SlaveState {
	/// the slave answers on the bus
	pub online: bool,
	/// the slave is in operational state and exchanges process data
	pub operational: bool,
	/// AL state bits, normally only one is set
	pub al_state: AlMixedState,
}

/// aggregated state of all slaves of one master, or of all masters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MasterState {
	/// number of slaves answering on the bus
	pub slaves_responding: u32,
	/// union of AL states of all responding slaves
	pub al_states: AlMixedState,
	/// the ethernet link is up
	pub link_up: bool,
}
impl MasterState {
	/// every responding slave is operational
	pub fn all_op(&self) -> bool {
		self.al_states.all_operational()
	}
	/**
		merge the states of several masters

		the link is considered up only if there is at least one master and all of them have their link up
	*/
	pub fn aggregate<'a>(states: impl IntoIterator<Item=&'a MasterState>) -> MasterState {
		let mut global = MasterState::default();
		let mut any = false;
		global.link_up = true;
		for state in states {
			any = true;
			global.slaves_responding += state.slaves_responding;
			global.al_states = global.al_states | state.al_states;
			global.link_up &= state.link_up;
		}
		global.link_up &= any;
		global
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mixed_state_bits() {
		let state = AlMixedState::from_bits(0x0c);
		assert!(state.safe_operational() && state.operational());
		assert!(! state.all_operational());
		assert!(AlMixedState::from(AlState::Operational).all_operational());
		assert_eq!(AlState::try_from(AlMixedState::from_bits(0x02)), Ok(AlState::PreOperational));
		assert!(AlState::try_from(state).is_err());
	}

	#[test]
	fn aggregate_masters() {
		let empty = MasterState::aggregate([]);
		assert!(! empty.link_up);
		let a = MasterState {slaves_responding: 2, al_states: AlMixedState::from_bits(0x08), link_up: true};
		let b = MasterState {slaves_responding: 1, al_states: AlMixedState::from_bits(0x04), link_up: true};
		let global = MasterState::aggregate([&a, &b]);
		assert_eq!(global.slaves_responding, 3);
		assert_eq!(global.al_states.bits(), 0x0c);
		assert!(global.link_up);
		assert!(! global.all_op());
		let c = MasterState {link_up: false, .. a};
		assert!(! MasterState::aggregate([&a, &c]).link_up);
	}
}

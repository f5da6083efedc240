/*!
	observability and tuning values shared with the host runtime

	A pin is a named value cell shared between the realtime task and any other thread. Pins are created during setup and then accessed lock-free, so the cyclic code never waits for an observer.

	names follow `ecat.<master>.<pin>` for masters and `ecat.<master>.<slave>.<pin>` for slaves
*/

use crate::error::{EthercatError, EthercatResult};
use std::{
	collections::BTreeMap,
	sync::Arc,
	};
use core::sync::atomic::{
	AtomicBool, AtomicU32, AtomicI32, AtomicU64,
	Ordering::Relaxed,
	};

/// prefix of every pin name exported by this crate
pub const MODULE_NAME: &str = "ecat";

/// direction of a pin, seen from the crate
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinDir {
	/// written by the host, read by the crate
	In,
	/// written by the crate, read by the host
	Out,
	/// both sides may write
	Io,
}

#[derive(Clone, Debug, Default)]
pub struct BitPin(Arc<AtomicBool>);
impl BitPin {
	pub fn get(&self) -> bool  {self.0.load(Relaxed)}
	pub fn set(&self, value: bool)  {self.0.store(value, Relaxed)}
}

#[derive(Clone, Debug, Default)]
pub struct U32Pin(Arc<AtomicU32>);
impl U32Pin {
	pub fn get(&self) -> u32  {self.0.load(Relaxed)}
	pub fn set(&self, value: u32)  {self.0.store(value, Relaxed)}
}

#[derive(Clone, Debug, Default)]
pub struct S32Pin(Arc<AtomicI32>);
impl S32Pin {
	pub fn get(&self) -> i32  {self.0.load(Relaxed)}
	pub fn set(&self, value: i32)  {self.0.store(value, Relaxed)}
}

/// float pins store the bits of a `f64` in an atomic integer
#[derive(Clone, Debug, Default)]
pub struct FloatPin(Arc<AtomicU64>);
impl FloatPin {
	pub fn get(&self) -> f64  {f64::from_bits(self.0.load(Relaxed))}
	pub fn set(&self, value: f64)  {self.0.store(value.to_bits(), Relaxed)}
}

/// any kind of pin, as stored in a [PinTable]
#[derive(Clone, Debug)]
pub enum Pin {
	Bit(BitPin),
	U32(U32Pin),
	S32(S32Pin),
	Float(FloatPin),
}

/// all pins exported by a master, indexed by name
#[derive(Debug, Default)]
pub struct PinTable {
	pins: BTreeMap<String, (PinDir, Pin)>,
}
impl PinTable {
	pub fn new() -> Self  {Self::default()}

	fn insert(&mut self, name: String, dir: PinDir, pin: Pin) -> EthercatResult {
		if self.pins.contains_key(&name) {
			log::error!("pin {} already exists", name);
			return Err(EthercatError::Config("duplicate pin name"));
		}
		self.pins.insert(name, (dir, pin));
		Ok(())
	}
	pub fn new_bit(&mut self, dir: PinDir, name: String) -> EthercatResult<BitPin> {
		let pin = BitPin::default();
		self.insert(name, dir, Pin::Bit(pin.clone()))?;
		Ok(pin)
	}
	pub fn new_u32(&mut self, dir: PinDir, name: String) -> EthercatResult<U32Pin> {
		let pin = U32Pin::default();
		self.insert(name, dir, Pin::U32(pin.clone()))?;
		Ok(pin)
	}
	pub fn new_s32(&mut self, dir: PinDir, name: String) -> EthercatResult<S32Pin> {
		let pin = S32Pin::default();
		self.insert(name, dir, Pin::S32(pin.clone()))?;
		Ok(pin)
	}
	pub fn new_float(&mut self, dir: PinDir, name: String) -> EthercatResult<FloatPin> {
		let pin = FloatPin::default();
		self.insert(name, dir, Pin::Float(pin.clone()))?;
		Ok(pin)
	}

	pub fn get(&self, name: &str) -> Option<&Pin>  {self.pins.get(name).map(|(_, pin)| pin)}
	pub fn direction(&self, name: &str) -> Option<PinDir>  {self.pins.get(name).map(|(dir, _)| *dir)}
	pub fn bit(&self, name: &str) -> Option<BitPin> {
		match self.get(name)? {Pin::Bit(pin) => Some(pin.clone()),  _ => None}
	}
	pub fn u32(&self, name: &str) -> Option<U32Pin> {
		match self.get(name)? {Pin::U32(pin) => Some(pin.clone()),  _ => None}
	}
	pub fn s32(&self, name: &str) -> Option<S32Pin> {
		match self.get(name)? {Pin::S32(pin) => Some(pin.clone()),  _ => None}
	}
	pub fn float(&self, name: &str) -> Option<FloatPin> {
		match self.get(name)? {Pin::Float(pin) => Some(pin.clone()),  _ => None}
	}
	/// iterate over pin names in lexical order
	pub fn names(&self) -> impl Iterator<Item=&str>  {self.pins.keys().map(String::as_str)}
	pub fn len(&self) -> usize  {self.pins.len()}
	pub fn is_empty(&self) -> bool  {self.pins.is_empty()}
}

/// pins describing the state of one slave
#[derive(Clone, Debug)]
pub(crate) struct SlaveStatePins {
	pub online: BitPin,
	pub operational: BitPin,
	pub init: BitPin,
	pub preop: BitPin,
	pub safeop: BitPin,
	pub op: BitPin,
}
impl SlaveStatePins {
	pub fn new(table: &mut PinTable, prefix: &str) -> EthercatResult<Self> {
		Ok(Self {
			online: table.new_bit(PinDir::Out, format!("{}.slave-online", prefix))?,
			operational: table.new_bit(PinDir::Out, format!("{}.slave-oper", prefix))?,
			init: table.new_bit(PinDir::Out, format!("{}.slave-state-init", prefix))?,
			preop: table.new_bit(PinDir::Out, format!("{}.slave-state-preop", prefix))?,
			safeop: table.new_bit(PinDir::Out, format!("{}.slave-state-safeop", prefix))?,
			op: table.new_bit(PinDir::Out, format!("{}.slave-state-op", prefix))?,
		})
	}
	pub fn publish(&self, state: &crate::state::SlaveState) {
		self.online.set(state.online);
		self.operational.set(state.operational);
		self.init.set(state.al_state.init());
		self.preop.set(state.al_state.pre_operational());
		self.safeop.set(state.al_state.safe_operational());
		self.op.set(state.al_state.operational());
	}
}

/// pins describing the aggregated state of a master or of all masters
#[derive(Clone, Debug)]
pub(crate) struct MasterStatePins {
	pub slaves_responding: U32Pin,
	pub init: BitPin,
	pub preop: BitPin,
	pub safeop: BitPin,
	pub op: BitPin,
	pub link_up: BitPin,
	pub all_op: BitPin,
}
impl MasterStatePins {
	pub fn new(table: &mut PinTable, prefix: &str) -> EthercatResult<Self> {
		Ok(Self {
			slaves_responding: table.new_u32(PinDir::Out, format!("{}.slaves-responding", prefix))?,
			init: table.new_bit(PinDir::Out, format!("{}.state-init", prefix))?,
			preop: table.new_bit(PinDir::Out, format!("{}.state-preop", prefix))?,
			safeop: table.new_bit(PinDir::Out, format!("{}.state-safeop", prefix))?,
			op: table.new_bit(PinDir::Out, format!("{}.state-op", prefix))?,
			link_up: table.new_bit(PinDir::Out, format!("{}.link-up", prefix))?,
			all_op: table.new_bit(PinDir::Out, format!("{}.all-op", prefix))?,
		})
	}
	pub fn publish(&self, state: &crate::state::MasterState) {
		self.slaves_responding.set(state.slaves_responding);
		self.init.set(state.al_states.init());
		self.preop.set(state.al_states.pre_operational());
		self.safeop.set(state.al_states.safe_operational());
		self.op.set(state.al_states.operational());
		self.link_up.set(state.link_up);
		self.all_op.set(state.all_op());
	}
}

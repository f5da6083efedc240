/*!
	slaves described entirely by configuration

	A generic slave gets its sync managers, PDOs and entries from [crate::config::SlaveConfig::layout], and each entry may be exported as one or several pins. An entry carrying several pins is split in bit ranges, so that a status word can give one bit pin per flag for instance.

	Pins of output sync managers are written by the host and copied to the process data, pins of input sync managers are copied from the process data.
*/

use crate::{
	binding::PdoHandle,
	device::{Device, SlaveCycle, SlaveSetup},
	error::{EthercatError, EthercatResult},
	mapping::{SyncBuilder, SyncDirection, WatchdogMode},
	pins::{PinDir, BitPin, U32Pin, S32Pin, FloatPin},
	};

/// how the bits of an entry are exported
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GenericKind {
	#[default]
	Bit,
	/// signed integer, sign-extended from its bit length
	S32,
	U32,
	/// signed raw value scaled to a float
	Float,
	/// unsigned raw value scaled to a float
	FloatUnsigned,
}

/// one pin exported from a bit range of an entry
#[derive(Clone, Debug, PartialEq)]
pub struct GenericPin {
	pub name: String,
	pub kind: GenericKind,
	/// first bit of the range in the entry
	pub bit_offset: u16,
	/// width of the range, 0 for the whole entry
	pub bit_length: u8,
	/// float pins only, `value = raw * scale + offset`
	pub scale: f64,
	pub offset: f64,
}
impl GenericPin {
	pub fn new(name: &str, kind: GenericKind) -> Self {
		Self {
			name: name.into(),
			kind,
			bit_offset: 0,
			bit_length: 0,
			scale: 1.,
			offset: 0.,
		}
	}
	/// restrict the pin to a bit range of the entry
	pub fn bits(mut self, offset: u16, length: u8) -> Self {
		self.bit_offset = offset;
		self.bit_length = length;
		self
	}
	pub fn scaled(mut self, scale: f64, offset: f64) -> Self {
		self.scale = scale;
		self.offset = offset;
		self
	}
}

/// one PDO entry, entries with index 0 are padding
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenericEntry {
	pub index: u16,
	pub subindex: u8,
	pub bit_length: u8,
	pub pins: Vec<GenericPin>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenericPdo {
	pub index: u16,
	pub entries: Vec<GenericEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenericSync {
	pub direction: SyncDirection,
	pub watchdog: WatchdogMode,
	pub pdos: Vec<GenericPdo>,
}

#[derive(Clone, Debug)]
enum PinCell {
	Bit(BitPin),
	S32(S32Pin),
	U32(U32Pin),
	Float {value: FloatPin, scale: FloatPin, offset: FloatPin, signed: bool},
}

#[derive(Clone, Debug)]
struct Binding {
	entry: PdoHandle,
	shift: u16,
	len: u8,
	direction: SyncDirection,
	cell: PinCell,
}

/// extend the sign of a `len` bits value
fn sign_extend(raw: u64, len: u8) -> i64 {
	if len == 0 || len >= 64  {return raw as i64}
	let shift = 64 - len as u32;
	((raw << shift) as i64) >> shift
}

/// device driving the pins of a generic slave
pub struct Generic {
	bindings: Vec<Binding>,
}

impl Device for Generic {
	fn read(&mut self, cycle: &mut SlaveCycle<'_>) {
		for binding in self.bindings.iter().filter(|b| b.direction == SyncDirection::Input) {
			let Some(raw) = cycle.bits(binding.entry, binding.shift, binding.len)  else {continue};
			match &binding.cell {
				PinCell::Bit(pin) => pin.set(raw & 1 == 1),
				PinCell::S32(pin) => pin.set(sign_extend(raw, binding.len) as i32),
				PinCell::U32(pin) => pin.set(raw as u32),
				PinCell::Float {value, scale, offset, signed} => {
					let raw =
						if *signed  {sign_extend(raw, binding.len) as f64}
						else        {raw as f64};
					value.set(raw * scale.get() + offset.get());
				},
			}
		}
	}
	fn write(&mut self, cycle: &mut SlaveCycle<'_>) {
		for binding in self.bindings.iter().filter(|b| b.direction == SyncDirection::Output) {
			let raw = match &binding.cell {
				PinCell::Bit(pin) => pin.get() as u64,
				PinCell::S32(pin) => pin.get() as i64 as u64,
				PinCell::U32(pin) => pin.get() as u64,
				PinCell::Float {value, scale, offset, ..} => {
					let scale = match scale.get() {
						s if s.abs() < 1e-20 => 1.,
						s => s,
					};
					((value.get() - offset.get()) / scale).round() as i64 as u64
				},
			};
			cycle.set_bits(binding.entry, binding.shift, binding.len, raw);
		}
	}
}

/// init hook of generic slaves
pub fn init(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	let layout = setup.slave().generic_layout().to_vec();
	if layout.is_empty() {
		log::warn!("slave {}: generic slave without layout", setup.name());
		return Ok(Box::new(Generic {bindings: Vec::new()}));
	}

	let mut syncs = SyncBuilder::new();
	for sync in &layout {
		syncs.add_sync(sync.direction, sync.watchdog)?;
		for pdo in &sync.pdos {
			syncs.add_pdo(pdo.index)?;
			for entry in &pdo.entries {
				syncs.add_entry(entry.index, entry.subindex, entry.bit_length)?;
			}
		}
	}
	setup.set_layout(syncs.finish())?;

	let pin_dir = |direction: SyncDirection| match direction {
		SyncDirection::Input => PinDir::Out,
		SyncDirection::Output => PinDir::In,
	};
	let mut bindings = Vec::new();
	for sync in &layout {
		for entry in sync.pdos.iter().flat_map(|pdo| pdo.entries.iter()) {
			if entry.index == 0 || entry.pins.is_empty()  {continue}
			let handle = setup.declare(entry.index, entry.subindex)?;
			for pin in &entry.pins {
				let len = if pin.bit_length == 0 {entry.bit_length} else {pin.bit_length};
				if pin.bit_offset as usize + len as usize > entry.bit_length as usize || len > 64 {
					log::error!("slave {}: pin {} exceeds its entry {:04x}:{:02x}", setup.name(), pin.name, entry.index, entry.subindex);
					return Err(EthercatError::Config("pin bit range exceeds its entry"));
				}
				let dir = pin_dir(sync.direction);
				let cell = match pin.kind {
					GenericKind::Bit => PinCell::Bit(setup.bit_pin(dir, &pin.name)?),
					GenericKind::S32 => PinCell::S32(setup.s32_pin(dir, &pin.name)?),
					GenericKind::U32 => PinCell::U32(setup.u32_pin(dir, &pin.name)?),
					GenericKind::Float | GenericKind::FloatUnsigned => {
						let value = setup.float_pin(dir, &pin.name)?;
						let scale = setup.float_pin(PinDir::Io, &format!("{}-scale", pin.name))?;
						let offset = setup.float_pin(PinDir::Io, &format!("{}-offset", pin.name))?;
						scale.set(pin.scale);
						offset.set(pin.offset);
						PinCell::Float {value, scale, offset, signed: pin.kind == GenericKind::Float}
					},
				};
				bindings.push(Binding {
					entry: handle,
					shift: pin.bit_offset,
					len,
					direction: sync.direction,
					cell,
				});
			}
		}
	}
	log::debug!("slave {}: generic layout with {} pins", setup.name(), bindings.len());
	Ok(Box::new(Generic {bindings}))
}

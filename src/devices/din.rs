/*!
	digital inputs, as a reusable channel class and the Beckhoff EL1xxx terminals

	A channel is either a whole 1-bit entry, or one bit of a wider entry shared by several channels. In the latter case every channel declares the same entry, and they all get the same registration.
*/

use crate::{
	binding::PdoHandle,
	device::{Device, SlaveCycle, SlaveSetup},
	error::EthercatResult,
	mapping::{SyncBuilder, SyncDirection, WatchdogMode},
	pins::{PinDir, BitPin},
	registry::DeviceType,
	};

/// vendor id of Beckhoff Automation
pub const BECKHOFF_VID: u32 = 0x2;

/// one digital input exported as `<name>` and `<name>-not`
#[derive(Clone, Debug)]
pub struct DinChannel {
	entry: PdoHandle,
	/// bit of the channel in its entry, for packed channels
	packed: Option<u16>,
	input: BitPin,
	inverted: BitPin,
}
impl DinChannel {
	/// channel named `din-<id>` mapped to a whole entry
	pub fn new(setup: &mut SlaveSetup<'_>, id: usize, index: u16, subindex: u8) -> EthercatResult<Self> {
		Self::named(setup, index, subindex, &format!("din-{}", id))
	}
	/// channel with a custom name mapped to a whole entry
	pub fn named(setup: &mut SlaveSetup<'_>, index: u16, subindex: u8, name: &str) -> EthercatResult<Self> {
		Ok(Self {
			entry: setup.declare(index, subindex)?,
			packed: None,
			input: setup.bit_pin(PinDir::Out, name)?,
			inverted: setup.bit_pin(PinDir::Out, &format!("{}-not", name))?,
		})
	}
	/// channel mapped to bit `bit` of a wider entry
	pub fn packed(setup: &mut SlaveSetup<'_>, index: u16, subindex: u8, bit: u16, name: &str) -> EthercatResult<Self> {
		Ok(Self {
			packed: Some(bit),
			.. Self::named(setup, index, subindex, name)?
		})
	}
	pub fn read(&self, cycle: &SlaveCycle<'_>) {
		if let Some(value) = cycle.bit(self.entry, self.packed) {
			self.input.set(value);
			self.inverted.set(! value);
		}
	}
	pub fn get(&self) -> bool  {self.input.get()}
}

/// all digital inputs of a slave
#[derive(Clone, Debug, Default)]
pub struct DinChannels(pub Vec<DinChannel>);
impl DinChannels {
	pub fn read_all(&self, cycle: &SlaveCycle<'_>) {
		for channel in &self.0 {
			channel.read(cycle);
		}
	}
}

/// EL1xxx terminals, flags hold the number of channels
pub const TYPES: &[DeviceType] = &[
	DeviceType::new("EL1002", BECKHOFF_VID, 0x03ea3052, init_el1xxx).flags(2),
	DeviceType::new("EL1004", BECKHOFF_VID, 0x03ec3052, init_el1xxx).flags(4),
	DeviceType::new("EL1008", BECKHOFF_VID, 0x03f03052, init_el1xxx).flags(8),
	DeviceType::new("EL1018", BECKHOFF_VID, 0x03fa3052, init_el1xxx).flags(8),
	];

struct El1xxx {
	inputs: DinChannels,
}
impl Device for El1xxx {
	fn read(&mut self, cycle: &mut SlaveCycle<'_>) {
		self.inputs.read_all(cycle);
	}
}

/// one input sync manager with one single-entry PDO per channel
fn init_el1xxx(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	let count = setup.flags() as u16;
	let mut syncs = SyncBuilder::new();
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
	for i in 0 .. count {
		syncs.add_pdo(0x1a00 + i)?;
		syncs.add_entry(0x6000 + (i << 4), 1, 1)?;
	}
	setup.set_layout(syncs.finish())?;

	let inputs = (0 .. count)
		.map(|i| DinChannel::new(setup, i as usize, 0x6000 + (i << 4), 1))
		.collect::<EthercatResult<Vec<_>>>()?;
	Ok(Box::new(El1xxx {inputs: DinChannels(inputs)}))
}

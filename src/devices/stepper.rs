/*!
	Leadshine EtherCAT stepper drives, following the CiA 402 profile in cyclic synchronous position mode

	Every axis maps its control word, target position and digital outputs in the output sync manager, and its status word, actual position and digital inputs in the input sync manager. Axis `n` uses the objects of axis 0 shifted by `0x800 * n`.

	These drives only accept a few entries per PDO, so the layout is built with autoflow: entries overflowing a PDO go to the next PDO index. The limits and the PDO index increment can be changed with options.
*/

use super::din::DinChannel;
use crate::{
	binding::PdoHandle,
	config::DcConfig,
	device::{Device, SlaveCycle, SlaveSetup},
	error::EthercatResult,
	mapping::{AutoFlow, SyncBuilder, SyncDirection, WatchdogMode},
	pins::{PinDir, BitPin, U32Pin, S32Pin},
	registry::{DeviceType, ModParamDesc, ModParamType},
	sdo::{InitCommand, SdoPart},
	slave::Slave,
	};

pub const LEADSHINE_VID: u32 = 0x4321;

/// option ids
pub const M_CHANNELS: u32 = 0;
pub const M_RXPDOLIMIT: u32 = 1;
pub const M_TXPDOLIMIT: u32 = 2;
pub const M_PDOINCREMENT: u32 = 3;

pub const MODPARAMS: &[ModParamDesc] = &[
	ModParamDesc::new("ciaChannels", M_CHANNELS, ModParamType::U32),
	ModParamDesc::new("ciaRxPDOEntryLimit", M_RXPDOLIMIT, ModParamType::U32),
	ModParamDesc::new("ciaTxPDOEntryLimit", M_TXPDOLIMIT, ModParamType::U32),
	ModParamDesc::new("ciaPDOIncrement", M_PDOINCREMENT, ModParamType::U32),
	];

const SCHEMA: &[&[ModParamDesc]] = &[MODPARAMS];

/// entries per PDO these drives accept by default
const DEFAULT_PDO_ENTRY_LIMIT: u32 = 8;
/// PDOs per sync manager
const PDO_LIMIT: usize = 4;
/// cyclic synchronous position mode
const MODE_CSP: u8 = 8;
/// offset between the objects of two axes
const AXIS_STRIDE: u16 = 0x800;

pub const fn f_axes(axes: u64) -> u64  {axes << 60}
pub const fn f_din(din: u64) -> u64  {din << 56}
pub const fn f_dout(dout: u64) -> u64  {dout << 52}
pub const fn axes(flags: u64) -> u64  {(flags >> 60) & 0xf}
pub const fn din(flags: u64) -> u64  {(flags >> 56) & 0xf}
pub const fn dout(flags: u64) -> u64  {(flags >> 52) & 0xf}

const fn stepper(name: &'static str, product: u32, flags: u64) -> DeviceType {
	DeviceType::new(name, LEADSHINE_VID, product, init)
		.flags(flags)
		.modparams(SCHEMA)
		.preinit(preinit)
}

pub const TYPES: &[DeviceType] = &[
	// single axis, closed loop
	stepper("CS3E-D503", 0x1300, f_din(7) | f_dout(7)),
	stepper("CS3E-D507", 0x1100, f_din(7) | f_dout(7)),
	stepper("CS3E-D1008", 0x1200, f_din(7) | f_dout(7)),
	stepper("CS3E-D503E", 0x700, f_din(6) | f_dout(2)),
	stepper("CS3E-D507E", 0x500, f_din(6) | f_dout(2)),
	// single axis, open loop
	stepper("EM3E-522E", 0x8800, f_din(6) | f_dout(2)),
	stepper("EM3E-556E", 0x8600, f_din(6) | f_dout(2)),
	stepper("EM3E-870E", 0x8700, f_din(6) | f_dout(2)),
	// dual axis
	stepper("2CS3E-D503", 0x2200, f_axes(2) | f_din(4) | f_dout(2)),
	stepper("2CS3E-D507", 0x2100, f_axes(2) | f_din(4) | f_dout(2)),
	stepper("2EM3E-D522", 0xa300, f_axes(2) | f_din(4) | f_dout(2)),
	stepper("2EM3E-D556", 0xa100, f_axes(2) | f_din(4) | f_dout(2)),
	stepper("2EM3E-D870", 0xa200, f_axes(2) | f_din(4) | f_dout(2)),
	];

/// number of axes of a slave, from its options or flags
fn channels(slave: &Slave) -> u16 {
	let count = slave.modparam(M_CHANNELS)
		.and_then(|value| value.u32())
		.unwrap_or(axes(slave.flags()) as u32);
	count.clamp(1, 4) as u16
}

/// switch every axis to cyclic synchronous position before the slave is configured
fn preinit(slave: &mut Slave) -> EthercatResult {
	for axis in 0 .. channels(slave) {
		slave.push_command(InitCommand::sdo(0x6060 + AXIS_STRIDE * axis, SdoPart::Sub(0), [MODE_CSP]));
	}
	Ok(())
}

/**
	next control word to send for the given status word

	walks the CiA 402 state machine up to *operation enabled* when `enable` is set, and back to *ready to switch on* otherwise. A fault is reset only when enabling.
*/
pub fn controlword(status: u16, enable: bool) -> u16 {
	const SHUTDOWN: u16 = 0x06;
	const SWITCH_ON: u16 = 0x07;
	const ENABLE_OPERATION: u16 = 0x0f;
	const FAULT_RESET: u16 = 0x80;

	if status & 0x4f == 0x08 {
		return if enable {FAULT_RESET} else {0};
	}
	if ! enable  {return SHUTDOWN}
	match status & 0x6f {
		0x21 => SWITCH_ON,
		0x23 | 0x27 => ENABLE_OPERATION,
		_ => SHUTDOWN,
	}
}

/// status word says operation enabled
fn operation_enabled(status: u16) -> bool  {status & 0x6f == 0x27}

struct DoutChannel {
	entry: PdoHandle,
	bit: u16,
	output: BitPin,
}

struct Axis {
	controlword: PdoHandle,
	target_position: PdoHandle,
	statusword: PdoHandle,
	actual_position: PdoHandle,
	enable: BitPin,
	target: S32Pin,
	actual: S32Pin,
	status_pin: U32Pin,
	control_pin: U32Pin,
	enabled: BitPin,
	fault: BitPin,
	inputs: Vec<DinChannel>,
	outputs: Vec<DoutChannel>,
	status: u16,
}

impl Axis {
	fn new(setup: &mut SlaveSetup<'_>, axis: u16, prefix: &str) -> EthercatResult<Self> {
		let base = AXIS_STRIDE * axis;
		let name = |pin: &str| format!("{}{}", prefix, pin);
		let flags = setup.flags();
		let mut this = Self {
			controlword: setup.declare(0x6040 + base, 0)?,
			target_position: setup.declare(0x607a + base, 0)?,
			statusword: setup.declare(0x6041 + base, 0)?,
			actual_position: setup.declare(0x6064 + base, 0)?,
			enable: setup.bit_pin(PinDir::In, &name("cia-enable"))?,
			target: setup.s32_pin(PinDir::In, &name("cia-target-position"))?,
			actual: setup.s32_pin(PinDir::Out, &name("cia-actual-position"))?,
			status_pin: setup.u32_pin(PinDir::Out, &name("cia-statusword"))?,
			control_pin: setup.u32_pin(PinDir::Out, &name("cia-controlword"))?,
			enabled: setup.bit_pin(PinDir::Out, &name("cia-enabled"))?,
			fault: setup.bit_pin(PinDir::Out, &name("cia-fault"))?,
			inputs: Vec::new(),
			outputs: Vec::new(),
			status: 0,
		};
		// digital inputs and outputs are the high word of their entry
		for i in 0 .. din(flags) as u16 {
			this.inputs.push(DinChannel::packed(setup, 0x60fd + base, 0, 16 + i, &name(&format!("din-{}", i)))?);
		}
		for i in 0 .. dout(flags) as u16 {
			this.outputs.push(DoutChannel {
				entry: setup.declare(0x60fe + base, 1)?,
				bit: 16 + i,
				output: setup.bit_pin(PinDir::In, &name(&format!("dout-{}", i)))?,
			});
		}
		Ok(this)
	}

	fn read(&mut self, cycle: &SlaveCycle<'_>) {
		if let Some(status) = cycle.get::<u16>(self.statusword) {
			self.status = status;
			self.status_pin.set(status as u32);
			self.enabled.set(operation_enabled(status));
			self.fault.set(status & 0x4f == 0x08);
		}
		if let Some(position) = cycle.get::<i32>(self.actual_position) {
			self.actual.set(position);
		}
		for input in &self.inputs {
			input.read(cycle);
		}
	}

	fn write(&mut self, cycle: &mut SlaveCycle<'_>) {
		let control = controlword(self.status, self.enable.get());
		self.control_pin.set(control as u32);
		cycle.set(self.controlword, control);
		// hold the current position until the drive follows commands
		let target =
			if operation_enabled(self.status)  {self.target.get()}
			else                              {self.actual.get()};
		cycle.set(self.target_position, target);
		for output in &self.outputs {
			cycle.set_bit(output.entry, Some(output.bit), output.output.get());
		}
	}
}

struct Stepper {
	axes: Vec<Axis>,
}
impl Device for Stepper {
	fn read(&mut self, cycle: &mut SlaveCycle<'_>) {
		for axis in self.axes.iter_mut() {
			axis.read(cycle);
		}
	}
	fn write(&mut self, cycle: &mut SlaveCycle<'_>) {
		for axis in self.axes.iter_mut() {
			axis.write(cycle);
		}
	}
}

fn init(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	let channels = channels(setup.slave());
	let option = |id| setup.modparam(id).and_then(|value| value.u32());
	let rx_limit = option(M_RXPDOLIMIT).unwrap_or(DEFAULT_PDO_ENTRY_LIMIT).max(1) as usize;
	let tx_limit = option(M_TXPDOLIMIT).unwrap_or(DEFAULT_PDO_ENTRY_LIMIT).max(1) as usize;
	let increment = option(M_PDOINCREMENT).unwrap_or(1).max(1) as u16;
	let flags = setup.flags();

	if ! setup.has_dc() {
		let period = setup.period();
		setup.set_dc(
			if channels == 2 {
				DcConfig {assign_activate: 0x700, sync0_cycle: period, sync1_cycle: period, .. Default::default()}
			} else {
				DcConfig {assign_activate: 0x300, sync0_cycle: period, .. Default::default()}
			});
	}

	let mut syncs = SyncBuilder::new();
	// mailbox sync managers
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Default)?;
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;

	syncs.set_autoflow(AutoFlow {entry_limit: rx_limit, pdo_limit: PDO_LIMIT, increment});
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Enable)?;
	syncs.add_pdo(0x1600)?;
	for axis in 0 .. channels {
		let base = AXIS_STRIDE * axis;
		syncs.add_entry(0x6040 + base, 0, 16)?;
		syncs.add_entry(0x607a + base, 0, 32)?;
		if dout(flags) != 0
			{syncs.add_entry(0x60fe + base, 1, 32)?}
	}

	syncs.set_autoflow(AutoFlow {entry_limit: tx_limit, pdo_limit: PDO_LIMIT, increment});
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
	syncs.add_pdo(0x1a00)?;
	for axis in 0 .. channels {
		let base = AXIS_STRIDE * axis;
		syncs.add_entry(0x6041 + base, 0, 16)?;
		syncs.add_entry(0x6064 + base, 0, 32)?;
		if din(flags) != 0
			{syncs.add_entry(0x60fd + base, 0, 32)?}
	}
	setup.set_layout(syncs.finish())?;

	let axes = (0 .. channels)
		.map(|axis| {
			let prefix = if channels > 1 {format!("srv-{}-", axis + 1)} else {String::new()};
			Axis::new(setup, axis, &prefix)
		})
		.collect::<EthercatResult<Vec<_>>>()?;
	log::debug!("slave {}: {} axes, pdo entry limits {}/{}", setup.name(), channels, rx_limit, tx_limit);
	Ok(Box::new(Stepper {axes}))
}

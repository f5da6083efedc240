/*!
	interface between the crate and device drivers

	A driver is called in two very different contexts:

	- [SlaveSetup] once per slave at startup, before activation. It declares the sync managers and PDO entries, reads its options, creates its pins, and may talk to the slave through blocking mailbox transfers.
	- [SlaveCycle] once per cycle from the realtime task, only while the slave is operational. It only gives access to the process data of the declared entries, nothing there can block.

	the object returned by the init hook implements [Device], whose hooks all default to doing nothing.
*/

use crate::{
	binding::{Identity, PdoHandle, Registrations},
	bus::Fieldbus,
	config::{DcConfig, WatchdogConfig},
	data::{Offset, PduData, ProcessData},
	error::{EthercatError, EthercatResult},
	mapping::SyncInfo,
	pins::{PinTable, PinDir, BitPin, U32Pin, S32Pin, FloatPin, MODULE_NAME},
	registry::ModParamValue,
	sdo::{InitCommand, SdoPart},
	slave::Slave,
	state::SlaveState,
	};

/// cyclic behavior of a device, created by its init hook
pub trait Device: Send {
	/// process inputs of this cycle, called after the bus data was received
	fn read(&mut self, _cycle: &mut SlaveCycle<'_>) {}
	/// prepare outputs of this cycle, called before the bus data is sent
	fn write(&mut self, _cycle: &mut SlaveCycle<'_>) {}
	/// release resources, called once at shutdown or when the startup fails
	fn cleanup(&mut self) {}
}

/// device without any cyclic behavior, for slaves only needing configuration
pub struct Passive;
impl Device for Passive {}

/// setup context of one slave
pub struct SlaveSetup<'a> {
	pub(crate) slave: &'a mut Slave,
	pub(crate) bus: &'a mut dyn Fieldbus,
	pub(crate) pins: &'a mut PinTable,
	pub(crate) master: &'a str,
	pub(crate) period: u32,
}
impl<'a> SlaveSetup<'a> {
	pub fn name(&self) -> &str  {self.slave.name()}
	pub fn identity(&self) -> Identity  {self.slave.identity()}
	/// device-private flags of the slave type
	pub fn flags(&self) -> u64  {self.slave.flags()}
	/// period of the master's realtime task, in nanoseconds
	pub fn period(&self) -> u32  {self.period}
	pub fn slave(&self) -> &Slave  {&*self.slave}

	/// value of an option, by the id given in the device schema
	pub fn modparam(&self, id: u32) -> Option<&ModParamValue>  {self.slave.modparam(id)}

	/// set the sync manager layout of the slave, it can be set only once
	pub fn set_layout(&mut self, layout: Vec<SyncInfo>) -> EthercatResult {
		if self.slave.layout.is_some()
			{return Err(EthercatError::Config("slave layout already set"))}
		self.slave.layout = Some(layout);
		Ok(())
	}
	/// declare a PDO entry to access in the process data
	pub fn declare(&mut self, index: u16, subindex: u8) -> EthercatResult<PdoHandle> {
		let identity = self.slave.identity();
		self.slave.registrations.declare(identity, index, subindex)
	}
	pub fn registrations(&self) -> &Registrations  {&self.slave.registrations}

	pub fn has_dc(&self) -> bool  {self.slave.dc.is_some()}
	/// set the distributed clock config, unless the configuration already gave one
	pub fn set_dc(&mut self, dc: DcConfig) -> bool  {self.slave.set_dc(dc)}
	pub fn has_watchdog(&self) -> bool  {self.slave.watchdog.is_some()}
	/// set the watchdog config, unless the configuration already gave one
	pub fn set_watchdog(&mut self, watchdog: WatchdogConfig) -> bool  {self.slave.set_watchdog(watchdog)}

	/// queue a mailbox command, sent by the bus when configuring the slave
	pub fn push_command(&mut self, command: InitCommand) {
		if let Some(handle) = self.slave.handle {
			crate::slave::queue_command(&mut *self.bus, handle, &command, self.slave.name());
		}
		self.slave.commands.push(command);
	}
	/// blocking CoE download
	pub fn sdo_download(&mut self, index: u16, sub: SdoPart, data: &[u8]) -> EthercatResult {
		self.bus.sdo_download(self.slave.identity(), index, sub, data)
			.map_err(|e| {
				log::error!("slave {}.{}: failed to write sdo {:04x}:{:02x}: {}", self.master, self.slave.name(), index, sub.subindex(), e);
				e
			})
	}
	/// blocking CoE upload, returns the number of bytes read
	pub fn sdo_upload(&mut self, index: u16, sub: SdoPart, data: &mut [u8]) -> EthercatResult<usize> {
		self.bus.sdo_upload(self.slave.identity(), index, sub, data)
			.map_err(|e| {
				log::error!("slave {}.{}: failed to read sdo {:04x}:{:02x}: {}", self.master, self.slave.name(), index, sub.subindex(), e);
				e
			})
	}

	/// full name of a pin of this slave
	pub fn pin_name(&self, name: &str) -> String {
		format!("{}.{}.{}.{}", MODULE_NAME, self.master, self.slave.name(), name)
	}
	pub fn bit_pin(&mut self, dir: PinDir, name: &str) -> EthercatResult<BitPin> {
		let name = self.pin_name(name);
		self.pins.new_bit(dir, name)
	}
	pub fn u32_pin(&mut self, dir: PinDir, name: &str) -> EthercatResult<U32Pin> {
		let name = self.pin_name(name);
		self.pins.new_u32(dir, name)
	}
	pub fn s32_pin(&mut self, dir: PinDir, name: &str) -> EthercatResult<S32Pin> {
		let name = self.pin_name(name);
		self.pins.new_s32(dir, name)
	}
	pub fn float_pin(&mut self, dir: PinDir, name: &str) -> EthercatResult<FloatPin> {
		let name = self.pin_name(name);
		self.pins.new_float(dir, name)
	}
}

/**
	cycle context of one slave

	accessors return `None` or do nothing when an entry has no valid offset, which cannot happen for entries declared at setup once the master is active
*/
pub struct SlaveCycle<'a> {
	pub(crate) data: &'a mut ProcessData,
	pub(crate) registrations: &'a Registrations,
	pub(crate) state: SlaveState,
	pub(crate) period: i64,
}
impl<'a> SlaveCycle<'a> {
	/// duration of the current cycle, in nanoseconds
	pub fn period(&self) -> i64  {self.period}
	pub fn state(&self) -> SlaveState  {self.state}
	pub fn operational(&self) -> bool  {self.state.operational}

	/// resolved location of a declared entry
	pub fn offset(&self, entry: PdoHandle) -> Option<Offset>  {self.registrations.offset(entry)}

	/// read a byte-aligned value
	pub fn get<T: PduData>(&self, entry: PdoHandle) -> Option<T> {
		self.data.get(self.offset(entry)?).ok()
	}
	/// write a byte-aligned value
	pub fn set<T: PduData>(&mut self, entry: PdoHandle, value: T) {
		if let Some(offset) = self.offset(entry) {
			self.data.set(offset, value).ok();
		}
	}
	/// read a bit entry, or the given bit of a wider entry when `packed` is set
	pub fn bit(&self, entry: PdoHandle, packed: Option<u16>) -> Option<bool> {
		let offset = self.offset(entry)?;
		let offset = match packed {
			Some(bit) => offset.packed(bit),
			None => offset,
		};
		self.data.bit(offset).ok()
	}
	/// write a bit entry, or the given bit of a wider entry when `packed` is set
	pub fn set_bit(&mut self, entry: PdoHandle, packed: Option<u16>, value: bool) {
		if let Some(offset) = self.offset(entry) {
			let offset = match packed {
				Some(bit) => offset.packed(bit),
				None => offset,
			};
			self.data.set_bit(offset, value).ok();
		}
	}
	/// read `len` bits starting `shift` bits after the entry start
	pub fn bits(&self, entry: PdoHandle, shift: u16, len: u8) -> Option<u64> {
		let offset = self.offset(entry)?;
		let start = offset.byte * 8 + offset.bit as usize + shift as usize;
		self.data.bits(Offset::new(start / 8, (start % 8) as u8), len).ok()
	}
	/// write `len` bits starting `shift` bits after the entry start
	pub fn set_bits(&mut self, entry: PdoHandle, shift: u16, len: u8, value: u64) {
		if let Some(offset) = self.offset(entry) {
			let start = offset.byte * 8 + offset.bit as usize + shift as usize;
			self.data.set_bits(Offset::new(start / 8, (start % 8) as u8), len, value).ok();
		}
	}
	/// raw process data of the whole master
	pub fn data(&mut self) -> &mut ProcessData  {&mut *self.data}
}

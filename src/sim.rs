/*!
	in-memory fieldbus, for tests and demos

	[SimBus] behaves like a fieldbus library with all configured slaves present on the segment. It computes a real process data layout from the submitted sync managers: every sync manager with PDOs gets a byte-aligned region, in slave then sync order, and its entries are packed bit after bit in it.

	The bus keeps its own *wire image* of the domain. [Fieldbus::process] copies the input regions of the wire image to the process data, and [Fieldbus::queue] copies the output regions of the process data to the wire image, so tests can both inject inputs and check outputs at the byte level.
*/

use crate::{
	binding::{Identity, PdoEntryReg},
	bus::{Fieldbus, SlaveHandle},
	config::{DcConfig, WatchdogConfig},
	data::Offset,
	error::{EthercatError, EthercatResult},
	mapping::{SyncInfo, SyncDirection},
	sdo::{Idn, InitCommand, SdoPart},
	state::{AlState, MasterState, SlaveState},
	};
use std::collections::{BTreeMap, VecDeque};

/// slave as configured in a [SimBus]
#[derive(Clone, Debug, Default)]
pub struct SimSlave {
	pub identity: Identity,
	pub layout: Vec<SyncInfo>,
	pub dc: Option<DcConfig>,
	pub watchdog: Option<WatchdogConfig>,
	/// mailbox commands queued, in order
	pub commands: Vec<InitCommand>,
	/// object dictionary reached by blocking transfers
	pub dictionary: BTreeMap<(u16, u8), Vec<u8>>,
}

/// region of the domain exchanged with one sync manager
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
	pub start: usize,
	pub len: usize,
	pub direction: SyncDirection,
}

/// counters of the calls received, for assertions
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SimCounters {
	pub receive: usize,
	pub process: usize,
	pub queue: usize,
	pub send: usize,
	pub application_time: usize,
	pub sync_reference: usize,
	pub sync_slaves: usize,
	pub reference_reads: usize,
	pub state_polls: usize,
	pub registrations: usize,
}

/// loopback implementation of [Fieldbus]
#[derive(Clone, Debug)]
pub struct SimBus {
	slaves: Vec<SimSlave>,
	/// slave states by ring position, slaves not listed are online and operational once activated
	states: BTreeMap<u16, SlaveState>,
	link_up: bool,
	regions: Vec<Region>,
	domain_size: usize,
	image: Vec<u8>,

	application_time: u64,
	previous_application_time: u64,
	/// readings returned first by [Fieldbus::reference_clock_time]
	reference_readings: VecDeque<Option<u32>>,
	/// when no reading is queued, the reference clock trails the previous application time by this offset
	reference_offset: Option<i64>,

	/// failure injection
	pub fail_slave_config: Option<u16>,
	pub fail_commands: bool,
	pub fail_register: bool,
	pub fail_activate: bool,

	activated: bool,
	released: bool,
	counters: SimCounters,
}

impl Default for SimBus {
	fn default() -> Self  {Self::new()}
}

impl SimBus {
	pub fn new() -> Self {
		Self {
			slaves: Vec::new(),
			states: BTreeMap::new(),
			link_up: true,
			regions: Vec::new(),
			domain_size: 0,
			image: Vec::new(),
			application_time: 0,
			previous_application_time: 0,
			reference_readings: VecDeque::new(),
			reference_offset: None,
			fail_slave_config: None,
			fail_commands: false,
			fail_register: false,
			fail_activate: false,
			activated: false,
			released: false,
			counters: SimCounters::default(),
		}
	}

	pub fn slaves(&self) -> &[SimSlave]  {&self.slaves}
	/// configured slave at the given ring position
	pub fn slave(&self, position: u16) -> Option<&SimSlave> {
		self.slaves.iter().find(|slave| slave.identity.position == position)
	}
	pub fn slave_mut(&mut self, position: u16) -> Option<&mut SimSlave> {
		self.slaves.iter_mut().find(|slave| slave.identity.position == position)
	}
	pub fn regions(&self) -> &[Region]  {&self.regions}
	pub fn domain_size(&self) -> usize  {self.domain_size}
	pub fn counters(&self) -> SimCounters  {self.counters}
	pub fn is_activated(&self) -> bool  {self.activated}
	pub fn is_released(&self) -> bool  {self.released}
	/// last application time received
	pub fn last_application_time(&self) -> u64  {self.application_time}

	/// force the state reported for the slave at the given position
	pub fn set_slave_state(&mut self, position: u16, state: SlaveState) {
		self.states.insert(position, state);
	}
	/// report the slave at the given position as operational or not, keeping it online
	pub fn set_operational(&mut self, position: u16, operational: bool) {
		let al_state = if operational {AlState::Operational} else {AlState::SafeOperational};
		self.set_slave_state(position, SlaveState {
			online: true,
			operational,
			al_state: al_state.into(),
		});
	}
	pub fn set_link(&mut self, up: bool)  {self.link_up = up}

	/// queue readings of the reference clock, `None` for a failed read
	pub fn push_reference_readings(&mut self, readings: impl IntoIterator<Item=Option<u32>>) {
		self.reference_readings.extend(readings);
	}
	/// make the reference clock trail the application time, `None` makes every read fail
	pub fn set_reference_offset(&mut self, offset: Option<i64>) {
		self.reference_offset = offset;
	}

	/// wire image of the domain, as last sent or to be received
	pub fn image(&self) -> &[u8]  {&self.image}
	pub fn image_mut(&mut self) -> &mut [u8]  {&mut self.image}

	fn configured(&mut self, handle: SlaveHandle) -> EthercatResult<&mut SimSlave> {
		self.slaves.get_mut(handle.0)
			.ok_or(EthercatError::Master("unknown slave handle"))
	}
	fn addressed(&mut self, slave: Identity) -> EthercatResult<&mut SimSlave> {
		self.slaves.iter_mut()
			.find(|sim| sim.identity.alias == slave.alias && sim.identity.position == slave.position)
			.ok_or(EthercatError::Master("no slave at this address"))
	}

	/**
		compute the domain regions and the bit offset of every mapped entry

		returns, per configured slave, its entries with their absolute bit position
	*/
	fn layout(&mut self) -> Vec<Vec<(u16, u8, usize)>> {
		self.regions.clear();
		let mut byte = 0;
		let mut mapped = Vec::with_capacity(self.slaves.len());
		for slave in &self.slaves {
			let mut entries = Vec::new();
			for sync in &slave.layout {
				let bits = sync.bit_size();
				if bits == 0  {continue}
				let mut bit = byte * 8;
				for entry in sync.pdos.iter().flat_map(|pdo| pdo.entries.iter()) {
					entries.push((entry.index, entry.subindex, bit));
					bit += entry.bit_length as usize;
				}
				let len = (bits + 7) / 8;
				self.regions.push(Region {start: byte, len, direction: sync.direction});
				byte += len;
			}
			mapped.push(entries);
		}
		self.domain_size = byte;
		mapped
	}
}

impl Fieldbus for SimBus {
	fn slave_config(&mut self, slave: Identity) -> EthercatResult<SlaveHandle> {
		if self.fail_slave_config == Some(slave.position)
			{return Err(EthercatError::Master("slave configuration rejected"))}
		if let Some(existing) = self.slaves.iter()
				.position(|sim| sim.identity.alias == slave.alias && sim.identity.position == slave.position) {
			if self.slaves[existing].identity != slave
				{return Err(EthercatError::Config("slave already configured with another identity"))}
			return Ok(SlaveHandle(existing));
		}
		self.slaves.push(SimSlave {identity: slave, .. Default::default()});
		Ok(SlaveHandle(self.slaves.len() - 1))
	}
	fn config_sdo(&mut self, slave: SlaveHandle, index: u16, sub: SdoPart, data: &[u8]) -> EthercatResult {
		if self.fail_commands
			{return Err(EthercatError::Protocol("sdo request rejected"))}
		let slave = self.configured(slave)?;
		slave.commands.push(InitCommand::sdo(index, sub, data));
		slave.dictionary.insert((index, sub.subindex()), data.to_vec());
		Ok(())
	}
	fn config_idn(&mut self, slave: SlaveHandle, drive: u8, idn: Idn, state: AlState, data: &[u8]) -> EthercatResult {
		if self.fail_commands
			{return Err(EthercatError::Protocol("idn request rejected"))}
		self.configured(slave)?.commands.push(InitCommand::idn(drive, idn, state, data));
		Ok(())
	}
	fn config_dc(&mut self, slave: SlaveHandle, dc: &DcConfig) -> EthercatResult {
		self.configured(slave)?.dc = Some(*dc);
		Ok(())
	}
	fn config_watchdog(&mut self, slave: SlaveHandle, watchdog: &WatchdogConfig) -> EthercatResult {
		self.configured(slave)?.watchdog = Some(*watchdog);
		Ok(())
	}
	fn config_pdos(&mut self, slave: SlaveHandle, layout: &[SyncInfo]) -> EthercatResult {
		self.configured(slave)?.layout = layout.to_vec();
		Ok(())
	}
	fn register_pdo_entries(&mut self, entries: &[PdoEntryReg]) -> EthercatResult<Vec<Offset>> {
		self.counters.registrations += 1;
		if self.fail_register
			{return Err(EthercatError::Master("pdo entry registration failed"))}
		let mapped = self.layout();
		let mut offsets = Vec::with_capacity(entries.len());
		for entry in entries {
			let slave = self.slaves.iter()
				.position(|sim| sim.identity.alias == entry.slave.alias && sim.identity.position == entry.slave.position)
				.ok_or(EthercatError::Config("registered entry of an unconfigured slave"))?;
			if self.slaves[slave].identity != entry.slave
				{return Err(EthercatError::Config("registered entry with a wrong slave identity"))}
			let bit = mapped[slave].iter()
				.find(|(index, subindex, _)| *index == entry.index && *subindex == entry.subindex)
				.map(|(_, _, bit)| *bit)
				.ok_or(EthercatError::Config("registered entry is not mapped"))?;
			offsets.push(Offset::new(bit / 8, (bit % 8) as u8));
		}
		Ok(offsets)
	}

	fn sdo_download(&mut self, slave: Identity, index: u16, sub: SdoPart, data: &[u8]) -> EthercatResult {
		self.addressed(slave)?.dictionary.insert((index, sub.subindex()), data.to_vec());
		Ok(())
	}
	fn sdo_upload(&mut self, slave: Identity, index: u16, sub: SdoPart, data: &mut [u8]) -> EthercatResult<usize> {
		let value = self.addressed(slave)?.dictionary.get(&(index, sub.subindex()))
			.ok_or(EthercatError::Protocol("sdo does not exist"))?;
		if value.len() > data.len()
			{return Err(EthercatError::Master("buffer too small for sdo"))}
		data[.. value.len()].copy_from_slice(value);
		Ok(value.len())
	}

	fn application_time(&mut self, time: u64) {
		self.counters.application_time += 1;
		self.previous_application_time = self.application_time;
		self.application_time = time;
	}
	fn activate(&mut self) -> EthercatResult<usize> {
		if self.fail_activate
			{return Err(EthercatError::Master("activation failed"))}
		if self.domain_size == 0 && self.regions.is_empty() {
			self.layout();
		}
		self.image = vec![0; self.domain_size];
		self.activated = true;
		Ok(self.domain_size)
	}
	fn deactivate(&mut self) {
		self.activated = false;
	}
	fn release(&mut self) {
		self.activated = false;
		self.released = true;
	}

	fn receive(&mut self) {
		self.counters.receive += 1;
	}
	fn process(&mut self, data: &mut [u8]) {
		self.counters.process += 1;
		for region in self.regions.iter().filter(|region| region.direction == SyncDirection::Input) {
			let range = region.start .. region.start + region.len;
			if let (Some(dst), Some(src)) = (data.get_mut(range.clone()), self.image.get(range)) {
				dst.copy_from_slice(src);
			}
		}
	}
	fn queue(&mut self, data: &[u8]) {
		self.counters.queue += 1;
		for region in self.regions.iter().filter(|region| region.direction == SyncDirection::Output) {
			let range = region.start .. region.start + region.len;
			if let (Some(dst), Some(src)) = (self.image.get_mut(range.clone()), data.get(range)) {
				dst.copy_from_slice(src);
			}
		}
	}
	fn send(&mut self) {
		self.counters.send += 1;
	}

	fn master_state(&mut self) -> MasterState {
		let mut state = MasterState {link_up: self.link_up, .. Default::default()};
		for sim in &self.slaves {
			let slave = self.current_state(sim.identity.position);
			if slave.online {
				state.slaves_responding += 1;
				state.al_states = state.al_states | slave.al_state;
			}
		}
		state
	}
	fn slave_state(&mut self, slave: SlaveHandle) -> SlaveState {
		self.counters.state_polls += 1;
		match self.slaves.get(slave.0) {
			Some(sim) => self.current_state(sim.identity.position),
			None => SlaveState::default(),
		}
	}

	fn sync_reference_clock(&mut self) {
		self.counters.sync_reference += 1;
	}
	fn sync_slave_clocks(&mut self) {
		self.counters.sync_slaves += 1;
	}
	fn reference_clock_time(&mut self) -> Option<u32> {
		self.counters.reference_reads += 1;
		if let Some(reading) = self.reference_readings.pop_front()
			{return reading}
		self.reference_offset.map(|offset|
			(self.previous_application_time as i64).wrapping_sub(offset) as u32)
	}
}

impl SimBus {
	fn current_state(&self, position: u16) -> SlaveState {
		if let Some(state) = self.states.get(&position)
			{return *state}
		if self.activated {
			SlaveState {online: true, operational: true, al_state: AlState::Operational.into()}
		}
		else {
			SlaveState {online: true, operational: false, al_state: AlState::PreOperational.into()}
		}
	}
}

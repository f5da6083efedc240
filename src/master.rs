/*!
	masters and their cyclic exchange

	A [Master] drives one fieldbus instance and owns its slaves. Its life goes through these stages:

	```text
	configuring --start--> started --first write--> active --deactivate--> stopped
	      \                   \                         \                      \
	       `--------------------`------ release --------`----------------------`--> released
	```

	The realtime task calls [Cyclic::read] then [Cyclic::write] each period. Activation happens in the first write, so the application time given to the bus is as close as possible to the first exchange.

	[Masters] groups all masters of a process and exports their aggregated state.
*/

use crate::{
	bus::Fieldbus,
	binding::PdoEntryReg,
	clock::{
		Scheduler, ClockSource, ClockSample, ClockStatus, ClockTuning, ClockPins,
		ApplicationClock, PhaseLock, Disciplined, Free,
		},
	config::{MasterConfig, SlaveConfig},
	data::ProcessData,
	device::SlaveCycle,
	error::{EthercatError, EthercatResult},
	pins::{PinTable, MasterStatePins, MODULE_NAME},
	registry::Registry,
	slave::Slave,
	state::MasterState,
	};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// lock a bus, a panic in another thread holding it does not leave it in an inconsistent state
fn lock<B>(bus: &Mutex<B>) -> MutexGuard<'_, B> {
	bus.lock().unwrap_or_else(PoisonError::into_inner)
}

/// entry points of the realtime task, `period` is the duration of the current cycle in nanoseconds
pub trait Cyclic {
	/// receive the bus data and run the slaves' read hooks
	fn read(&mut self, period: i64) -> EthercatResult;
	/// run the slaves' write hooks and send the bus data
	fn write(&mut self, period: i64) -> EthercatResult;
}

/// lifecycle stage of a master
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
	/// slaves can be added
	Configuring,
	/// slaves are set up, waiting for the first cyclic write
	Started,
	/// exchanging process data
	Active,
	/// deactivated, no more exchange
	Stopped,
	/// activation failed, nothing more happens until release
	Failed,
	/// bus released, slaves cleaned up
	Released,
}

/// one fieldbus master and its slaves
pub struct Master<B: Fieldbus> {
	config: MasterConfig,
	bus: Arc<Mutex<B>>,
	scheduler: Arc<dyn Scheduler>,
	slaves: Vec<Slave>,
	stage: Stage,
	data: ProcessData,

	clock: ApplicationClock,
	lock: Box<dyn PhaseLock>,
	tuning: ClockTuning,
	/// cycles before the next reference clock synchronization
	sync_ref_count: u32,
	/// time before the next state poll
	state_timer: i64,
	/// last cycle period seen, to report a mismatch only once
	period_seen: i64,
	state: MasterState,

	pins: PinTable,
	state_pins: MasterStatePins,
	clock_pins: Option<ClockPins>,
}

impl<B: Fieldbus> Master<B> {
	/**
		create a master driving the given bus

		the phase lock strategy is chosen here: disciplined when a clock config is given and the scheduler can be corrected, free otherwise
	*/
	pub fn new(config: MasterConfig, bus: B, scheduler: Arc<dyn Scheduler>) -> EthercatResult<Self> {
		if config.app_time_period == 0
			{return Err(EthercatError::Config("application period must not be null"))}
		let disciplined = config.clock.is_some() && scheduler.pll_supported();
		if config.clock.is_some() && ! disciplined
			{log::warn!("master {}: scheduler does not support clock correction, phase lock disabled", config.name)}
		let source =
			if ! config.sync_to_ref_clock  {ClockSource::Master}
			else if disciplined            {ClockSource::Reference}
			else {
				log::error!("master {}: sync to reference clock requires a disciplined scheduler, using the master clock", config.name);
				ClockSource::Master
			};
		let tuning = config.clock.unwrap_or_default().tuning(config.app_time_period);
		let lock: Box<dyn PhaseLock> =
			if disciplined  {Box::new(Disciplined::new())}
			else            {Box::new(Free::default())};

		let prefix = format!("{}.{}", MODULE_NAME, config.name);
		let mut pins = PinTable::new();
		let state_pins = MasterStatePins::new(&mut pins, &prefix)?;
		let clock_pins =
			if disciplined  {Some(ClockPins::new(&mut pins, &prefix, &tuning)?)}
			else            {None};

		Ok(Self {
			clock: ApplicationClock::new(source, config.app_time_period),
			period_seen: config.app_time_period as i64,
			config,
			bus: Arc::new(Mutex::new(bus)),
			scheduler,
			slaves: Vec::new(),
			stage: Stage::Configuring,
			data: ProcessData::default(),
			lock,
			tuning,
			sync_ref_count: 0,
			state_timer: 0,
			state: MasterState::default(),
			pins,
			state_pins,
			clock_pins,
		})
	}

	pub fn name(&self) -> &str  {&self.config.name}
	pub fn config(&self) -> &MasterConfig  {&self.config}
	pub fn stage(&self) -> Stage  {self.stage}
	pub fn is_activated(&self) -> bool  {self.stage == Stage::Active}
	/// shared access to the bus, for anything outside the cyclic exchange
	pub fn bus(&self) -> Arc<Mutex<B>>  {self.bus.clone()}
	pub fn pins(&self) -> &PinTable  {&self.pins}
	/// state as last polled
	pub fn state(&self) -> MasterState  {self.state}
	pub fn slaves(&self) -> &[Slave]  {&self.slaves}
	pub fn slave(&self, index: usize) -> Option<&Slave>  {self.slaves.get(index)}
	pub fn clock_source(&self) -> ClockSource  {self.clock.source()}
	pub fn clock_status(&self) -> ClockStatus  {*self.lock.status()}
	/// process data of the last cycle, empty until activation
	pub fn process_data(&self) -> &ProcessData  {&self.data}

	/**
		bind a slave configuration and append the slave to this master

		an unknown device type or an invalid option only skips this slave, `None` is returned then
	*/
	pub fn add_slave(&mut self, config: SlaveConfig, registry: &Registry) -> Option<usize> {
		if self.stage != Stage::Configuring {
			log::warn!("master {}: cannot add slave {} once started", self.config.name, config.name);
			return None;
		}
		let name = config.name.clone();
		match Slave::new(config, registry) {
			Ok(mut slave) => {
				slave.index = self.slaves.len();
				log::debug!("master {}: slave {} bound to {}", self.config.name, name, slave.binding().name());
				self.slaves.push(slave);
				Some(self.slaves.len() - 1)
			},
			Err(e) => {
				log::warn!("master {}: skipping slave {}: {}", self.config.name, name, e);
				None
			},
		}
	}

	/**
		set up all slaves and register their process data entries

		on failure the slaves already initialized are cleaned up in reverse order and the bus is released, the master cannot be used anymore
	*/
	pub fn start(&mut self) -> EthercatResult {
		if self.stage != Stage::Configuring
			{return Err(EthercatError::Master("master already started"))}
		match self.setup() {
			Ok(()) => {
				self.stage = Stage::Started;
				log::info!("master {}: {} slaves configured", self.config.name, self.slaves.len());
				Ok(())
			},
			Err(e) => {
				log::error!("master {}: startup failed: {}", self.config.name, e);
				self.release();
				Err(e)
			},
		}
	}

	fn setup(&mut self) -> EthercatResult {
		// safety logic slaves need all other slaves preinitialized
		for fsoe in [false, true] {
			for slave in self.slaves.iter_mut().filter(|slave| slave.binding().fsoe_logic() == fsoe) {
				if let Some(preinit) = slave.binding().preinit() {
					preinit(slave).map_err(|e| {
						log::error!("master {}: preinit of slave {} failed: {}", self.config.name, slave.name(), e);
						e
					})?;
				}
			}
		}

		let mut bus = lock(&self.bus);
		for slave in self.slaves.iter_mut() {
			slave.setup(&mut *bus, &mut self.pins, &self.config.name, self.config.app_time_period)
				.map_err(|e| {
					log::error!("master {}: setup of slave {} failed: {}", self.config.name, slave.name(), e);
					e
				})?;
		}

		let records = self.slaves.iter()
			.flat_map(|slave| slave.registrations.records().iter().copied())
			.collect::<Vec<PdoEntryReg>>();
		let offsets = bus.register_pdo_entries(&records)?;
		if offsets.len() != records.len()
			{return Err(EthercatError::Protocol("registration returned a wrong number of offsets"))}
		let mut start = 0;
		for slave in self.slaves.iter_mut() {
			let end = start + slave.registrations.len();
			slave.registrations.resolve(&offsets[start .. end])?;
			start = end;
		}
		log::debug!("master {}: {} pdo entries registered", self.config.name, records.len());
		Ok(())
	}

	/// seed the application time and switch the bus to operation
	fn activate(&mut self) -> EthercatResult {
		let initial = self.clock.activate(self.scheduler.wall_clock(), self.scheduler.now());
		let mut bus = lock(&self.bus);
		bus.application_time(initial);
		match bus.activate() {
			Ok(size) => {
				self.data = ProcessData::new(size);
				self.stage = Stage::Active;
				log::info!("master {}: activated with {} bytes of process data", self.config.name, size);
				Ok(())
			},
			Err(e) => {
				self.stage = Stage::Failed;
				log::error!("master {}: activation failed: {}", self.config.name, e);
				Err(e)
			},
		}
	}

	/// stop the cyclic exchange, the process data is not valid anymore
	pub fn deactivate(&mut self) {
		if self.stage != Stage::Active  {return}
		lock(&self.bus).deactivate();
		for slave in self.slaves.iter_mut() {
			slave.registrations.invalidate();
		}
		self.stage = Stage::Stopped;
		log::info!("master {}: deactivated", self.config.name);
	}

	/// clean up all slaves in reverse order, then release the bus
	pub fn release(&mut self) {
		if self.stage == Stage::Released  {return}
		for slave in self.slaves.iter_mut().rev() {
			slave.cleanup();
		}
		lock(&self.bus).release();
		self.stage = Stage::Released;
	}

	/// deactivate then release
	pub fn shutdown(&mut self) {
		self.deactivate();
		self.release();
	}

	fn check_period(&mut self, period: i64) {
		if period == self.period_seen  {return}
		if period != self.config.app_time_period as i64 {
			log::error!("master {}: cycle period {} ns differs from configured {} ns",
				self.config.name, period, self.config.app_time_period);
		}
		self.period_seen = period;
	}

	fn poll_states(&mut self, bus: &mut B) {
		self.state = bus.master_state();
		self.state_pins.publish(&self.state);
		for slave in self.slaves.iter_mut() {
			let Some(handle) = slave.handle  else {continue};
			let state = bus.slave_state(handle);
			if state.operational != slave.state.operational {
				log::info!("master {}: slave {} {}", self.config.name, slave.name(),
					if state.operational {"operational"} else {"not operational"});
			}
			slave.state = state;
			if let Some(pins) = &slave.pins {
				pins.publish(&state);
			}
		}
	}
}

impl<B: Fieldbus> Cyclic for Master<B> {
	fn read(&mut self, period: i64) -> EthercatResult {
		if self.stage != Stage::Active  {return Ok(())}
		self.check_period(period);
		{
			let bus = self.bus.clone();
			let mut bus = lock(&bus);
			bus.receive();
			bus.process(self.data.as_mut_slice());
			if self.state_timer > 0 {
				self.state_timer -= period;
			}
			else {
				self.state_timer = self.config.state_update_period as i64;
				self.poll_states(&mut bus);
			}
		}
		for slave in self.slaves.iter_mut() {
			if ! slave.state.operational  {continue}
			let Some(device) = slave.device.as_mut()  else {continue};
			device.read(&mut SlaveCycle {
				data: &mut self.data,
				registrations: &slave.registrations,
				state: slave.state,
				period,
			});
		}
		Ok(())
	}

	fn write(&mut self, period: i64) -> EthercatResult {
		match self.stage {
			Stage::Started => return self.activate(),
			Stage::Active => {},
			Stage::Configuring => return Err(EthercatError::Master("master not started")),
			_ => return Ok(()),
		}
		for slave in self.slaves.iter_mut() {
			if ! slave.state.operational  {continue}
			let Some(device) = slave.device.as_mut()  else {continue};
			device.write(&mut SlaveCycle {
				data: &mut self.data,
				registrations: &slave.registrations,
				state: slave.state,
				period,
			});
		}

		let app_time = self.clock.tick(self.scheduler.now(), self.scheduler.pll_reference(), period);
		let reference_time = {
			let mut bus = lock(&self.bus);
			bus.application_time(app_time);
			if self.clock.source() == ClockSource::Master {
				if self.sync_ref_count == 0 {
					self.sync_ref_count = self.config.sync_ref_cycles.max(1);
					bus.sync_reference_clock();
				}
				self.sync_ref_count -= 1;
			}
			bus.sync_slave_clocks();
			let reference_time = match self.clock.source() {
				ClockSource::Reference => bus.reference_clock_time(),
				ClockSource::Master => None,
			};
			bus.queue(self.data.as_slice());
			bus.send();
			reference_time
		};

		if let Some(pins) = &self.clock_pins {
			self.tuning = pins.tuning();
		}
		let sample = ClockSample {app_time, reference_time};
		if let Some(correction) = self.lock.update(sample, &mut self.clock, &self.tuning) {
			self.scheduler.set_pll_correction(correction);
		}
		if let Some(pins) = &self.clock_pins {
			pins.publish(self.lock.status());
		}
		Ok(())
	}
}

impl<B: Fieldbus> Drop for Master<B> {
	fn drop(&mut self) {
		self.shutdown();
	}
}

/// all masters of a process
pub struct Masters<B: Fieldbus> {
	masters: Vec<Master<B>>,
	pins: PinTable,
	state_pins: MasterStatePins,
	state: MasterState,
}
impl<B: Fieldbus> Masters<B> {
	pub fn new() -> EthercatResult<Self> {
		let mut pins = PinTable::new();
		let state_pins = MasterStatePins::new(&mut pins, MODULE_NAME)?;
		Ok(Self {
			masters: Vec::new(),
			pins,
			state_pins,
			state: MasterState::default(),
		})
	}
	pub fn push(&mut self, master: Master<B>) {
		self.masters.push(master);
	}
	pub fn len(&self) -> usize  {self.masters.len()}
	pub fn is_empty(&self) -> bool  {self.masters.is_empty()}
	pub fn get(&self, index: usize) -> Option<&Master<B>>  {self.masters.get(index)}
	pub fn get_mut(&mut self, index: usize) -> Option<&mut Master<B>>  {self.masters.get_mut(index)}
	pub fn iter(&self) -> impl Iterator<Item=&Master<B>>  {self.masters.iter()}
	/// global pins, named `ecat.<pin>`
	pub fn pins(&self) -> &PinTable  {&self.pins}
	/// state aggregated over all masters
	pub fn state(&self) -> MasterState  {self.state}

	/// start all masters in order, on failure every master is shut down
	pub fn start(&mut self) -> EthercatResult {
		for i in 0 .. self.masters.len() {
			if let Err(e) = self.masters[i].start() {
				self.shutdown();
				return Err(e);
			}
		}
		Ok(())
	}

	/// deactivate all masters, then release them in reverse order
	pub fn shutdown(&mut self) {
		for master in self.masters.iter_mut() {
			master.deactivate();
		}
		for master in self.masters.iter_mut().rev() {
			master.release();
		}
	}

	fn publish(&mut self) {
		self.state = MasterState::aggregate(self.masters.iter().map(|master| &master.state));
		self.state_pins.publish(&self.state);
	}
}

impl<B: Fieldbus> Cyclic for Masters<B> {
	/// read all masters, an error in one does not prevent the others, the first error is returned
	fn read(&mut self, period: i64) -> EthercatResult {
		let mut result = Ok(());
		for master in self.masters.iter_mut() {
			if let Err(e) = master.read(period) {
				if result.is_ok()  {result = Err(e)}
			}
		}
		self.publish();
		result
	}
	/// write all masters, an error in one does not prevent the others, the first error is returned
	fn write(&mut self, period: i64) -> EthercatResult {
		let mut result = Ok(());
		for master in self.masters.iter_mut() {
			if let Err(e) = master.write(period) {
				if result.is_ok()  {result = Err(e)}
			}
		}
		result
	}
}

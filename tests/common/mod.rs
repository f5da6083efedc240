#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use core::sync::atomic::{AtomicI64, Ordering::Relaxed};
use ethercycle::{
	Device, DeviceType, SlaveSetup, SlaveCycle, PdoHandle, PinDir,
	EthercatError, EthercatResult, Master, MasterConfig, Registry, Scheduler,
	mapping::{SyncBuilder, SyncDirection, WatchdogMode},
	pins::U32Pin,
	sim::SimBus,
	};

pub const PERIOD: u32 = 1_000_000;

/// scheduler whose clock only moves when told
#[derive(Debug, Default)]
pub struct TestScheduler {
	pub now: AtomicI64,
	pub pll: bool,
	pub corrections: Mutex<Vec<i32>>,
}
impl TestScheduler {
	pub fn new(pll: bool) -> Arc<Self> {
		Arc::new(Self {pll, .. Default::default()})
	}
	pub fn advance(&self, ns: i64) {
		self.now.fetch_add(ns, Relaxed);
	}
	pub fn corrections(&self) -> Vec<i32> {
		self.corrections.lock().unwrap().clone()
	}
}
impl Scheduler for TestScheduler {
	fn now(&self) -> i64  {self.now.load(Relaxed)}
	fn wall_clock(&self) -> u64  {800_000_000_000_000_000 + self.now() as u64}
	fn pll_supported(&self) -> bool  {self.pll}
	fn pll_reference(&self) -> i64  {self.now()}
	fn set_pll_correction(&self, correction: i32) {
		self.corrections.lock().unwrap().push(correction);
	}
}

/// names of the counter devices cleaned up, in order
pub static CLEANUPS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// device counting its cycles, with one 16 bit input and one 16 bit output
pub struct Counter {
	name: String,
	input: PdoHandle,
	output: PdoHandle,
	reads: U32Pin,
	writes: U32Pin,
	value_in: U32Pin,
	value_out: U32Pin,
}
impl Device for Counter {
	fn read(&mut self, cycle: &mut SlaveCycle<'_>) {
		self.reads.set(self.reads.get() + 1);
		if let Some(value) = cycle.get::<u16>(self.input) {
			self.value_in.set(value as u32);
		}
	}
	fn write(&mut self, cycle: &mut SlaveCycle<'_>) {
		self.writes.set(self.writes.get() + 1);
		cycle.set(self.output, self.value_out.get() as u16);
	}
	fn cleanup(&mut self) {
		CLEANUPS.lock().unwrap().push(self.name.clone());
	}
}

fn init_counter(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	let mut syncs = SyncBuilder::new();
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Default)?;
	syncs.add_pdo(0x1600)?;
	syncs.add_entry(0x7000, 1, 16)?;
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
	syncs.add_pdo(0x1a00)?;
	syncs.add_entry(0x6000, 1, 16)?;
	setup.set_layout(syncs.finish())?;

	Ok(Box::new(Counter {
		name: setup.name().to_owned(),
		output: setup.declare(0x7000, 1)?,
		input: setup.declare(0x6000, 1)?,
		reads: setup.u32_pin(PinDir::Out, "reads")?,
		writes: setup.u32_pin(PinDir::Out, "writes")?,
		value_in: setup.u32_pin(PinDir::Out, "value-in")?,
		value_out: setup.u32_pin(PinDir::In, "value-out")?,
	}))
}

fn init_broken(_: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	Err(EthercatError::Config("broken device"))
}

pub const TYPES: &[DeviceType] = &[
	DeviceType::new("counter", 0x1, 0x10, init_counter),
	DeviceType::new("broken", 0x1, 0x20, init_broken),
	];

/// builtin device types plus the test ones
pub fn registry() -> Registry {
	let mut registry = Registry::builtin();
	registry.register_all(TYPES);
	registry
}

/// master polling slave states every cycle
pub fn master(scheduler: Arc<TestScheduler>) -> Master<SimBus> {
	let config = MasterConfig {state_update_period: 0, .. Default::default()};
	Master::new(config, SimBus::new(), scheduler).unwrap()
}

/// run one period: read then write
pub fn cycle(master: &mut Master<SimBus>, scheduler: &TestScheduler) -> EthercatResult {
	use ethercycle::Cyclic;
	scheduler.advance(PERIOD as i64);
	master.read(PERIOD as i64)?;
	master.write(PERIOD as i64)
}

pub fn pin_u32(master: &Master<SimBus>, name: &str) -> u32 {
	master.pins().u32(name).unwrap().get()
}

mod common;

use ethercycle::{
	DcConfig, Device, DeviceType, EthercatError, EthercatResult, PinDir, SlaveConfig, SlaveSetup, WatchdogConfig,
	devices::generic::{GenericSync, GenericPdo, GenericEntry, GenericPin, GenericKind},
	mapping::{SyncDirection, WatchdogMode},
	sdo::{InitCommand, SdoPart},
	};
use common::{TestScheduler, PERIOD, cycle, master, registry};

fn init_logs() {
	let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn analog_outputs_and_digital_inputs() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	let registry = registry();
	master.add_slave(SlaveConfig::new(0, "EL4102", "ao"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "EL1008", "di"), &registry).unwrap();
	master.start().unwrap();
	cycle(&mut master, &scheduler).unwrap();

	let bus = master.bus();
	{
		let mut bus = bus.lock().unwrap();
		let regions = bus.regions().iter().map(|region| (region.start, region.len)).collect::<Vec<_>>();
		assert_eq!(regions, vec![(0, 4), (4, 1)]);
		bus.image_mut()[4] = 0b0000_0101;
	}
	let pins = master.pins();
	pins.bit("ecat.0.ao.aout-0-enable").unwrap().set(true);
	pins.float("ecat.0.ao.aout-0-value").unwrap().set(0.5);
	pins.bit("ecat.0.ao.aout-1-enable").unwrap().set(true);
	pins.float("ecat.0.ao.aout-1-value").unwrap().set(-2.);
	cycle(&mut master, &scheduler).unwrap();

	let pins = master.pins();
	assert_eq!(pins.s32("ecat.0.ao.aout-0-raw").unwrap().get(), 16383);
	assert!(pins.bit("ecat.0.ao.aout-0-pos").unwrap().get());
	// clamped to the minimum duty cycle
	assert_eq!(pins.s32("ecat.0.ao.aout-1-raw").unwrap().get(), -0x7fff);
	assert_eq!(pins.float("ecat.0.ao.aout-1-curr-dc").unwrap().get(), -1.);
	assert!(pins.bit("ecat.0.ao.aout-1-neg").unwrap().get());

	assert!(pins.bit("ecat.0.di.din-0").unwrap().get());
	assert!(! pins.bit("ecat.0.di.din-1").unwrap().get());
	assert!(pins.bit("ecat.0.di.din-1-not").unwrap().get());
	assert!(pins.bit("ecat.0.di.din-2").unwrap().get());
	assert!(! pins.bit("ecat.0.di.din-7").unwrap().get());

	let bus = bus.lock().unwrap();
	assert_eq!(&bus.image()[0 .. 2], &16383i16.to_le_bytes());
	assert_eq!(&bus.image()[2 .. 4], &(-0x7fffi16).to_le_bytes());
}

#[test]
fn analog_output_disabled() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	master.add_slave(SlaveConfig::new(0, "EL4132", "ao"), &registry()).unwrap();
	master.start().unwrap();
	cycle(&mut master, &scheduler).unwrap();

	master.pins().float("ecat.0.ao.aout-0-value").unwrap().set(0.5);
	cycle(&mut master, &scheduler).unwrap();
	assert_eq!(master.pins().s32("ecat.0.ao.aout-0-raw").unwrap().get(), 0);
	assert!(! master.pins().bit("ecat.0.ao.aout-0-pos").unwrap().get());
	assert_eq!(&master.bus().lock().unwrap().image()[0 .. 2], &[0, 0]);
}

#[test]
fn dual_axis_stepper() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	let config = SlaveConfig::new(0, "2CS3E-D503", "drive")
		.modparam("ciaRxPDOEntryLimit", "2")
		.modparam("ciaPDOIncrement", "0x10");
	master.add_slave(config, &registry()).unwrap();
	master.start().unwrap();

	{
		let bus = master.bus();
		let bus = bus.lock().unwrap();
		let slave = bus.slave(0).unwrap();
		// both axes switched to cyclic synchronous position before anything else
		assert_eq!(slave.commands, vec![
			InitCommand::sdo(0x6060, SdoPart::Sub(0), [8]),
			InitCommand::sdo(0x6860, SdoPart::Sub(0), [8]),
			]);
		assert_eq!(slave.dc, Some(DcConfig {
			assign_activate: 0x700,
			sync0_cycle: PERIOD,
			sync1_cycle: PERIOD,
			.. Default::default()
			}));
		assert_eq!(slave.layout.len(), 4);
		assert_eq!(slave.layout[2].watchdog, WatchdogMode::Enable);
		assert_eq!(slave.layout[2].pdos.iter().map(|pdo| pdo.index).collect::<Vec<_>>(), vec![0x1600, 0x1610, 0x1620]);
		assert_eq!(slave.layout[3].pdos.iter().map(|pdo| pdo.index).collect::<Vec<_>>(), vec![0x1a00]);
		assert_eq!(slave.layout[3].pdos[0].entries.len(), 6);
	}
	// packed digital io share one registration per entry and axis
	assert_eq!(master.slave(0).unwrap().registrations().len(), 12);
	assert!(master.pins().bit("ecat.0.drive.srv-2-din-3").is_some());
	assert!(master.pins().bit("ecat.0.drive.srv-1-dout-1").is_some());

	cycle(&mut master, &scheduler).unwrap();
	{
		let bus = master.bus();
		let mut bus = bus.lock().unwrap();
		// outputs take 20 bytes, then the inputs of axis 1: statusword, position, digital inputs
		let image = bus.image_mut();
		image[20 .. 22].copy_from_slice(&0x0040u16.to_le_bytes());
		image[22 .. 26].copy_from_slice(&1234i32.to_le_bytes());
		image[28] = 0b10;
	}
	master.pins().bit("ecat.0.drive.srv-1-cia-enable").unwrap().set(true);
	master.pins().bit("ecat.0.drive.srv-1-dout-0").unwrap().set(true);
	cycle(&mut master, &scheduler).unwrap();

	let pins = master.pins();
	assert_eq!(pins.u32("ecat.0.drive.srv-1-cia-statusword").unwrap().get(), 0x40);
	assert_eq!(pins.s32("ecat.0.drive.srv-1-cia-actual-position").unwrap().get(), 1234);
	assert_eq!(pins.u32("ecat.0.drive.srv-1-cia-controlword").unwrap().get(), 0x06);
	assert!(pins.bit("ecat.0.drive.srv-1-din-1").unwrap().get());
	assert!(! pins.bit("ecat.0.drive.srv-1-din-0").unwrap().get());
	assert!(! pins.bit("ecat.0.drive.srv-1-cia-enabled").unwrap().get());

	let bus = master.bus();
	let bus = bus.lock().unwrap();
	let image = bus.image();
	assert_eq!(&image[0 .. 2], &0x06u16.to_le_bytes());
	// position held while the drive is not enabled
	assert_eq!(&image[2 .. 6], &1234i32.to_le_bytes());
	assert_eq!(image[8], 0b1);
}

#[test]
fn configured_dc_kept() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let dc = DcConfig {assign_activate: 0x300, sync0_cycle: 2 * PERIOD, sync0_shift: 1000, .. Default::default()};
	let mut config = SlaveConfig::new(0, "CS3E-D503", "drive");
	config.dc = Some(dc);
	master.add_slave(config, &registry()).unwrap();
	master.start().unwrap();
	assert_eq!(master.bus().lock().unwrap().slave(0).unwrap().dc, Some(dc));
	assert_eq!(master.slave(0).unwrap().dc(), Some(&dc));
}

fn generic_layout() -> Vec<GenericSync> {
	vec![
		GenericSync {
			direction: SyncDirection::Output,
			watchdog: WatchdogMode::Default,
			pdos: vec![GenericPdo {index: 0x1600, entries: vec![
				GenericEntry {index: 0x7000, subindex: 1, bit_length: 16, pins: vec![
					GenericPin::new("setpoint", GenericKind::Float).scaled(0.5, 0.),
					]},
				GenericEntry {index: 0, subindex: 0, bit_length: 8, pins: vec![]},
				]}],
		},
		GenericSync {
			direction: SyncDirection::Input,
			watchdog: WatchdogMode::Default,
			pdos: vec![GenericPdo {index: 0x1a00, entries: vec![
				GenericEntry {index: 0x6000, subindex: 1, bit_length: 16, pins: vec![
					GenericPin::new("status", GenericKind::S32),
					GenericPin::new("ready", GenericKind::Bit).bits(0, 1),
					GenericPin::new("mode", GenericKind::U32).bits(4, 4),
					]},
				]}],
		},
	]
}

#[test]
fn generic_slave() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	let mut config = SlaveConfig::new(0, "generic", "gen");
	config.vendor = 0x99;
	config.product = 0x1;
	config.layout = generic_layout();
	master.add_slave(config, &registry()).unwrap();
	master.start().unwrap();
	assert_eq!(master.slave(0).unwrap().registrations().len(), 2);
	assert_eq!(master.bus().lock().unwrap().slave(0).unwrap().identity.vendor, 0x99);
	cycle(&mut master, &scheduler).unwrap();

	let bus = master.bus();
	{
		let mut bus = bus.lock().unwrap();
		let regions = bus.regions().iter().map(|region| (region.start, region.len)).collect::<Vec<_>>();
		assert_eq!(regions, vec![(0, 3), (3, 2)]);
		bus.image_mut()[3 .. 5].copy_from_slice(&0xfff1u16.to_le_bytes());
	}
	master.pins().float("ecat.0.gen.setpoint").unwrap().set(10.);
	cycle(&mut master, &scheduler).unwrap();

	let pins = master.pins();
	assert_eq!(pins.s32("ecat.0.gen.status").unwrap().get(), -15);
	assert!(pins.bit("ecat.0.gen.ready").unwrap().get());
	assert_eq!(pins.u32("ecat.0.gen.mode").unwrap().get(), 0xf);
	assert_eq!(pins.float("ecat.0.gen.setpoint-scale").unwrap().get(), 0.5);
	assert_eq!(&bus.lock().unwrap().image()[0 .. 2], &20u16.to_le_bytes());
}

#[test]
fn generic_pin_out_of_entry() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let mut layout = generic_layout();
	layout[1].pdos[0].entries[0].pins.push(GenericPin::new("overflow", GenericKind::U32).bits(12, 8));
	let mut config = SlaveConfig::new(0, "generic", "gen");
	config.layout = layout;
	master.add_slave(config, &registry()).unwrap();
	assert!(matches!(master.start(), Err(EthercatError::Config(_))));
}

/// driver reading back a parameter it wrote, with a default watchdog
fn init_mailbox(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	setup.sdo_download(0x2000, SdoPart::Sub(1), &500u16.to_le_bytes())?;
	let mut buffer = [0; 4];
	let size = setup.sdo_upload(0x2000, SdoPart::Sub(1), &mut buffer)?;
	let pin = setup.u32_pin(PinDir::Out, "filter")?;
	pin.set(u16::from_le_bytes([buffer[0], buffer[1]]) as u32);
	assert_eq!(size, 2);
	assert!(setup.sdo_upload(0x2001, SdoPart::Sub(0), &mut buffer).is_err());

	setup.set_watchdog(WatchdogConfig {divider: 2498, intervals: 1000});
	Ok(Box::new(ethercycle::device::Passive))
}
const MAILBOX: &[DeviceType] = &[DeviceType::new("mailbox", 0x7, 0x1, init_mailbox)];

#[test]
fn mailbox_transfers_at_init() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let mut registry = registry();
	registry.register_all(MAILBOX);
	let mut config = SlaveConfig::new(0, "mailbox", "mb");
	config.watchdog = Some(WatchdogConfig {divider: 100, intervals: 10});
	master.add_slave(config, &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "mailbox", "mb2"), &registry).unwrap();
	master.start().unwrap();

	assert_eq!(master.pins().u32("ecat.0.mb.filter").unwrap().get(), 500);
	let bus = master.bus();
	let bus = bus.lock().unwrap();
	// a configured watchdog is kept over the driver's default
	assert_eq!(bus.slave(0).unwrap().watchdog, Some(WatchdogConfig {divider: 100, intervals: 10}));
	assert_eq!(bus.slave(1).unwrap().watchdog, Some(WatchdogConfig {divider: 2498, intervals: 1000}));
	assert_eq!(bus.slave(1).unwrap().dictionary.get(&(0x2000, 1)), Some(&vec![0xf4, 0x01]));
}

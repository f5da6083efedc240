mod common;

use ethercycle::{
	Cyclic, EthercatError, Master, MasterConfig, Masters, SlaveConfig, Stage,
	sdo::{Idn, IdnKind, InitCommand, SdoPart},
	sim::SimBus,
	state::AlState,
	};
use common::{TestScheduler, PERIOD, CLEANUPS, cycle, master, registry, pin_u32};

const P: i64 = PERIOD as i64;

fn init_logs() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// cleaned up counters whose name starts with the given prefix, in cleanup order
fn cleaned(prefix: &str) -> Vec<String> {
	CLEANUPS.lock().unwrap().iter()
		.filter(|name| name.starts_with(prefix))
		.cloned()
		.collect()
}

#[test]
fn non_operational_slaves_skipped() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	let registry = registry();
	assert_eq!(master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry), Some(0));
	assert_eq!(master.add_slave(SlaveConfig::new(1, "counter", "b"), &registry), Some(1));
	master.start().unwrap();
	master.bus().lock().unwrap().set_operational(1, false);

	// activation cycle, no hook is called
	cycle(&mut master, &scheduler).unwrap();
	assert!(master.is_activated());
	assert_eq!(pin_u32(&master, "ecat.0.a.reads"), 0);
	assert_eq!(pin_u32(&master, "ecat.0.a.writes"), 0);

	for _ in 0 .. 3 {
		cycle(&mut master, &scheduler).unwrap();
	}
	assert_eq!(pin_u32(&master, "ecat.0.a.reads"), 3);
	assert_eq!(pin_u32(&master, "ecat.0.a.writes"), 3);
	assert_eq!(pin_u32(&master, "ecat.0.b.reads"), 0);
	assert_eq!(pin_u32(&master, "ecat.0.b.writes"), 0);
	assert!(! master.pins().bit("ecat.0.b.slave-oper").unwrap().get());
	assert!(master.pins().bit("ecat.0.b.slave-online").unwrap().get());
	assert!(master.pins().bit("ecat.0.b.slave-state-safeop").unwrap().get());
	assert!(! master.pins().bit("ecat.0.all-op").unwrap().get());

	master.bus().lock().unwrap().set_operational(1, true);
	cycle(&mut master, &scheduler).unwrap();
	assert_eq!(pin_u32(&master, "ecat.0.a.reads"), 4);
	assert_eq!(pin_u32(&master, "ecat.0.b.reads"), 1);
	assert_eq!(pin_u32(&master, "ecat.0.b.writes"), 1);
	assert!(master.pins().bit("ecat.0.b.slave-oper").unwrap().get());
	assert!(master.pins().bit("ecat.0.all-op").unwrap().get());
	assert_eq!(pin_u32(&master, "ecat.0.slaves-responding"), 2);
}

#[test]
fn process_data_exchange() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	let registry = registry();
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "counter", "b"), &registry).unwrap();
	master.start().unwrap();
	cycle(&mut master, &scheduler).unwrap();
	assert_eq!(master.process_data().len(), 8);

	let bus = master.bus();
	{
		let mut bus = bus.lock().unwrap();
		// output then input region of each slave
		let regions = bus.regions().iter().map(|region| (region.start, region.len)).collect::<Vec<_>>();
		assert_eq!(regions, vec![(0, 2), (2, 2), (4, 2), (6, 2)]);
		bus.image_mut()[2 .. 4].copy_from_slice(&0x1234u16.to_le_bytes());
		bus.image_mut()[6 .. 8].copy_from_slice(&0x5678u16.to_le_bytes());
	}
	master.pins().u32("ecat.0.b.value-out").unwrap().set(0xbeef);
	cycle(&mut master, &scheduler).unwrap();

	assert_eq!(pin_u32(&master, "ecat.0.a.value-in"), 0x1234);
	assert_eq!(pin_u32(&master, "ecat.0.b.value-in"), 0x5678);
	let bus = bus.lock().unwrap();
	assert_eq!(&bus.image()[0 .. 2], &[0, 0]);
	assert_eq!(&bus.image()[4 .. 6], &[0xef, 0xbe]);
	// inputs are never written back
	assert_eq!(&bus.image()[2 .. 4], &0x1234u16.to_le_bytes());
}

#[test]
fn activation_is_lazy() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	assert!(matches!(master.write(P), Err(EthercatError::Master(_))));

	master.start().unwrap();
	assert_eq!(master.stage(), Stage::Started);
	assert!(master.slave(0).unwrap().registrations().is_resolved());
	{
		let bus = master.bus();
		let bus = bus.lock().unwrap();
		assert!(! bus.is_activated());
		assert_eq!(bus.counters().registrations, 1);
	}

	// nothing is exchanged before the first write
	master.read(P).unwrap();
	assert_eq!(master.bus().lock().unwrap().counters().receive, 0);

	master.write(P).unwrap();
	assert_eq!(master.stage(), Stage::Active);
	{
		let bus = master.bus();
		let bus = bus.lock().unwrap();
		assert!(bus.is_activated());
		assert_eq!(bus.counters().send, 0);
		assert_eq!(bus.counters().application_time, 1);
	}

	master.write(P).unwrap();
	let counters = master.bus().lock().unwrap().counters();
	assert_eq!(counters.send, 1);
	assert_eq!(counters.queue, 1);
	assert_eq!(counters.application_time, 2);
	// no more registration once started
	assert_eq!(counters.registrations, 1);
	assert!(master.start().is_err());
}

#[test]
fn activation_failure_not_retried() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut bus = SimBus::new();
	bus.fail_activate = true;
	let config = MasterConfig {state_update_period: 0, .. Default::default()};
	let mut master = Master::new(config, bus, scheduler.clone()).unwrap();
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	master.start().unwrap();

	assert!(cycle(&mut master, &scheduler).is_err());
	assert_eq!(master.stage(), Stage::Failed);
	for _ in 0 .. 3 {
		cycle(&mut master, &scheduler).unwrap();
	}
	let counters = master.bus().lock().unwrap().counters();
	assert_eq!(counters.application_time, 1);
	assert_eq!(counters.send, 0);
	assert_eq!(pin_u32(&master, "ecat.0.a.writes"), 0);
}

#[test]
fn reference_clock_sync_period() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let config = MasterConfig {state_update_period: 0, sync_ref_cycles: 3, .. Default::default()};
	let mut master = Master::new(config, SimBus::new(), scheduler.clone()).unwrap();
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	master.start().unwrap();

	cycle(&mut master, &scheduler).unwrap();
	for _ in 0 .. 7 {
		cycle(&mut master, &scheduler).unwrap();
	}
	let counters = master.bus().lock().unwrap().counters();
	// on the 1st, 4th and 7th active cycles
	assert_eq!(counters.sync_reference, 3);
	assert_eq!(counters.sync_slaves, 7);
	assert_eq!(counters.reference_reads, 0);
}

#[test]
fn application_time_follows_host() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	master.start().unwrap();

	cycle(&mut master, &scheduler).unwrap();
	let first = master.bus().lock().unwrap().last_application_time();
	cycle(&mut master, &scheduler).unwrap();
	let second = master.bus().lock().unwrap().last_application_time();
	assert_eq!(second - first, PERIOD as u64);
}

#[test]
fn state_polled_periodically() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let config = MasterConfig {state_update_period: 3 * PERIOD as u64, .. Default::default()};
	let mut master = Master::new(config, SimBus::new(), scheduler.clone()).unwrap();
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	master.start().unwrap();

	cycle(&mut master, &scheduler).unwrap();
	for _ in 0 .. 9 {
		cycle(&mut master, &scheduler).unwrap();
	}
	// polled on the 1st, 5th and 9th reads
	assert_eq!(master.bus().lock().unwrap().counters().state_polls, 3);
	assert_eq!(pin_u32(&master, "ecat.0.a.reads"), 9);
}

#[test]
fn startup_failure_cleans_up_in_reverse() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let registry = registry();
	master.add_slave(SlaveConfig::new(0, "counter", "startup-a"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "counter", "startup-b"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(2, "broken", "startup-c"), &registry).unwrap();

	assert!(matches!(master.start(), Err(EthercatError::Config(_))));
	assert_eq!(cleaned("startup-"), vec!["startup-b", "startup-a"]);
	assert_eq!(master.stage(), Stage::Released);
	assert!(master.bus().lock().unwrap().is_released());
	assert!(master.slaves().iter().all(|slave| ! slave.is_initialized()));
	// a released master never exchanges
	master.read(P).unwrap();
	master.write(P).unwrap();
	assert_eq!(master.bus().lock().unwrap().counters().application_time, 0);
}

#[test]
fn registration_failure_cleans_up() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut bus = SimBus::new();
	bus.fail_register = true;
	let mut master = Master::new(MasterConfig::default(), bus, scheduler).unwrap();
	let registry = registry();
	master.add_slave(SlaveConfig::new(0, "counter", "register-a"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "counter", "register-b"), &registry).unwrap();

	assert!(master.start().is_err());
	assert_eq!(cleaned("register-"), vec!["register-b", "register-a"]);
	assert!(master.bus().lock().unwrap().is_released());
}

#[test]
fn slave_config_failure_aborts_startup() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut bus = SimBus::new();
	bus.fail_slave_config = Some(1);
	let mut master = Master::new(MasterConfig::default(), bus, scheduler).unwrap();
	let registry = registry();
	master.add_slave(SlaveConfig::new(0, "counter", "config-a"), &registry).unwrap();
	master.add_slave(SlaveConfig::new(1, "counter", "config-b"), &registry).unwrap();

	assert!(master.start().is_err());
	assert_eq!(cleaned("config-"), vec!["config-a"]);
	assert_eq!(master.stage(), Stage::Released);
}

#[test]
fn invalid_slaves_skipped() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let registry = registry();
	assert_eq!(master.add_slave(SlaveConfig::new(0, "EL9999", "unknown"), &registry), None);
	assert_eq!(master.add_slave(
		SlaveConfig::new(0, "CS3E-D503", "drive").modparam("ciaSpeed", "1"),
		&registry), None);
	assert_eq!(master.add_slave(
		SlaveConfig::new(0, "CS3E-D503", "drive").modparam("ciaRxPDOEntryLimit", "-1"),
		&registry), None);
	assert_eq!(master.add_slave(
		SlaveConfig::new(0, "CS3E-D503", "drive").modparam("ciaRxPDOEntryLimit", "4"),
		&registry), Some(0));
	assert_eq!(master.add_slave(SlaveConfig::new(1, "EL1008", "din"), &registry), Some(1));
	assert_eq!(master.slaves().len(), 2);

	master.start().unwrap();
	assert_eq!(master.add_slave(SlaveConfig::new(2, "EL1008", "late"), &registry), None);
	assert_eq!(master.slaves().len(), 2);
}

#[test]
fn invalid_master_config() {
	let config = MasterConfig {app_time_period: 0, .. Default::default()};
	assert!(matches!(
		Master::new(config, SimBus::new(), TestScheduler::new(false)),
		Err(EthercatError::Config(_)),
		));
}

#[test]
fn init_commands_sent_in_order() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler);
	let idn = Idn::new(IdnKind::S, 0, 32);
	let mut config = SlaveConfig::new(0, "counter", "a");
	config.commands = vec![
		InitCommand::sdo(0x8000, SdoPart::Sub(1), [1]),
		InitCommand::idn(0, idn, AlState::PreOperational, [2, 0]),
		InitCommand::sdo(0x8001, SdoPart::Complete, [3, 4, 5]),
		];
	master.add_slave(config.clone(), &registry()).unwrap();
	master.start().unwrap();

	let bus = master.bus();
	let bus = bus.lock().unwrap();
	let slave = bus.slave(0).unwrap();
	assert_eq!(slave.commands, config.commands);
	assert_eq!(slave.identity.vendor, 0x1);
	assert_eq!(slave.identity.product, 0x10);
}

#[test]
fn init_command_failure_continues() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut bus = SimBus::new();
	bus.fail_commands = true;
	let mut master = Master::new(MasterConfig {state_update_period: 0, .. Default::default()}, bus, scheduler.clone()).unwrap();
	let mut config = SlaveConfig::new(0, "counter", "a");
	config.commands = vec![InitCommand::sdo(0x8000, SdoPart::Sub(1), [1])];
	master.add_slave(config, &registry()).unwrap();
	master.start().unwrap();

	assert!(master.bus().lock().unwrap().slave(0).unwrap().commands.is_empty());
	cycle(&mut master, &scheduler).unwrap();
	cycle(&mut master, &scheduler).unwrap();
	assert_eq!(pin_u32(&master, "ecat.0.a.reads"), 1);
}

#[test]
fn shutdown_invalidates_offsets() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut master = master(scheduler.clone());
	master.add_slave(SlaveConfig::new(0, "counter", "shutdown-a"), &registry()).unwrap();
	master.start().unwrap();
	cycle(&mut master, &scheduler).unwrap();
	cycle(&mut master, &scheduler).unwrap();

	master.deactivate();
	assert_eq!(master.stage(), Stage::Stopped);
	assert!(! master.slave(0).unwrap().registrations().is_resolved());
	assert!(! master.bus().lock().unwrap().is_activated());
	// stopped masters ignore the task
	cycle(&mut master, &scheduler).unwrap();
	assert_eq!(pin_u32(&master, "ecat.0.shutdown-a.reads"), 1);

	master.release();
	assert_eq!(master.stage(), Stage::Released);
	assert_eq!(cleaned("shutdown-"), vec!["shutdown-a"]);
	// releasing twice does nothing
	master.shutdown();
	assert_eq!(cleaned("shutdown-"), vec!["shutdown-a"]);
}

fn named_master(name: &str, bus: SimBus, scheduler: &std::sync::Arc<TestScheduler>) -> Master<SimBus> {
	let config = MasterConfig {name: name.into(), state_update_period: 0, .. Default::default()};
	let mut master = Master::new(config, bus, scheduler.clone()).unwrap();
	master.add_slave(SlaveConfig::new(0, "counter", "a"), &registry()).unwrap();
	master
}

#[test]
fn masters_aggregate_state() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut masters = Masters::new().unwrap();
	assert!(! masters.state().link_up);
	masters.push(named_master("0", SimBus::new(), &scheduler));
	masters.push(named_master("1", SimBus::new(), &scheduler));
	masters.start().unwrap();

	for _ in 0 .. 2 {
		scheduler.advance(P);
		masters.read(P).unwrap();
		masters.write(P).unwrap();
	}
	assert!(masters.state().link_up);
	assert_eq!(masters.state().slaves_responding, 2);
	assert!(masters.pins().bit("ecat.link-up").unwrap().get());
	assert!(masters.pins().bit("ecat.all-op").unwrap().get());
	assert_eq!(masters.pins().u32("ecat.slaves-responding").unwrap().get(), 2);

	masters.get(1).unwrap().bus().lock().unwrap().set_link(false);
	masters.read(P).unwrap();
	assert!(! masters.pins().bit("ecat.link-up").unwrap().get());
	assert!(masters.get(0).unwrap().pins().bit("ecat.0.link-up").unwrap().get());

	masters.shutdown();
	assert!(masters.iter().all(|master| master.stage() == Stage::Released));
}

#[test]
fn masters_continue_past_failure() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut failing = SimBus::new();
	failing.fail_activate = true;
	let mut masters = Masters::new().unwrap();
	masters.push(named_master("0", failing, &scheduler));
	masters.push(named_master("1", SimBus::new(), &scheduler));
	masters.start().unwrap();

	assert!(masters.write(P).is_err());
	assert_eq!(masters.get(0).unwrap().stage(), Stage::Failed);
	assert!(masters.get(1).unwrap().is_activated());
	// a failed master stays silent
	masters.read(P).unwrap();
	masters.write(P).unwrap();
}

#[test]
fn masters_start_failure_shuts_down_all() {
	init_logs();
	let scheduler = TestScheduler::new(false);
	let mut failing = SimBus::new();
	failing.fail_register = true;
	let mut masters = Masters::new().unwrap();
	masters.push(named_master("0", SimBus::new(), &scheduler));
	masters.push(named_master("1", failing, &scheduler));

	assert!(masters.start().is_err());
	assert!(masters.iter().all(|master| master.stage() == Stage::Released));
	assert!(masters.get(0).unwrap().bus().lock().unwrap().is_released());
}

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    time::Duration,
    };
use ethercycle::{
    ClockConfig, EthercatError, Master, MasterConfig, Masters, Registry, SlaveConfig,
    sim::SimBus,
    task::{self, SystemScheduler},
    };

pub const PERIOD: u32 = 1_000_000;

#[tokio::main]
async fn main() -> ethercycle::EthercatResult {
    env_logger::init();

    let registry = Registry::builtin();
    let scheduler = Arc::new(SystemScheduler::new(PERIOD, true));
    let config = MasterConfig {
        app_time_period: PERIOD,
        clock: Some(ClockConfig::default()),
        .. Default::default()
    };
    let mut master = Master::new(config, SimBus::new(), scheduler.clone())?;
    master.add_slave(SlaveConfig::new(0, "EL1008", "din"), &registry);
    master.add_slave(SlaveConfig::new(1, "EL4102", "aout"), &registry);
    master.add_slave(SlaveConfig::new(2, "2CS3E-D503", "drive")
        .modparam("ciaRxPDOEntryLimit", "4"), &registry);

    let mut masters = Masters::new()?;
    masters.push(master);
    masters.start()?;
    let pins = masters.get(0).map(|master| {
        let pins = master.pins();
        (pins.s32("ecat.0.pll-err"), pins.bit("ecat.0.dc-phased"), pins.bit("ecat.0.aout.aout-0-enable"), pins.float("ecat.0.aout.aout-0-value"))
    });
    if let Some((_, _, Some(enable), Some(value))) = &pins {
        enable.set(true);
        value.set(0.25);
    }

    // the realtime loop owns the masters, this thread only watches pins
    let stop = Arc::new(AtomicBool::new(false));
    let handle = task::spawn(masters, scheduler.clone(), stop.clone());

    for _ in 0 .. 5 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        if let Some((Some(error), Some(phased), _, _)) = &pins {
            log::info!("phase error {} ns, phased {}, correction {} ns", error.get(), phased.get(), scheduler.correction());
        }
    }
    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap_or(Err(EthercatError::Master("realtime task panicked")))
}

/*!
	Cyclic process data exchange of EtherCAT masters, with a distributed clock phase lock of the realtime task.

	The crate sits between an EtherCAT master library, abstracted by [Fieldbus], and a host realtime scheduler, abstracted by [Scheduler]. It owns:

	- the slaves of each master, bound at startup to device drivers from a [Registry]
	- the layout of their sync managers and the registration of their PDO entries
	- the per-cycle read and write dispatch to drivers ([Cyclic])
	- the phase lock between the host task and the slaves' distributed clocks ([clock])

	A typical startup is:

	```ignore
	let registry = Registry::builtin();
	let mut master = Master::new(MasterConfig::default(), bus, scheduler)?;
	master.add_slave(SlaveConfig::new(0, "EL1008", "din"), &registry);
	master.start()?;
	// then in the realtime task, every period
	master.read(period)?;
	master.write(period)?;
	```
*/

pub mod error;
pub mod data;
pub mod state;
pub mod pins;
pub mod mapping;
pub mod sdo;
pub mod binding;
pub mod config;
pub mod bus;
pub mod clock;
pub mod registry;
pub mod device;
pub mod slave;
pub mod master;
pub mod devices;
pub mod sim;
pub mod task;

pub use crate::error::{EthercatError, EthercatResult};
pub use crate::data::{PduData, Offset, ProcessData};
pub use crate::state::{AlState, AlMixedState, SlaveState, MasterState};
pub use crate::pins::{PinTable, PinDir};
pub use crate::binding::{Identity, PdoHandle};
pub use crate::config::{MasterConfig, SlaveConfig, DcConfig, WatchdogConfig};
pub use crate::bus::{Fieldbus, SlaveHandle};
pub use crate::clock::{Scheduler, ClockConfig, ClockSource, DriftMode};
pub use crate::registry::{Registry, DeviceType};
pub use crate::device::{Device, SlaveSetup, SlaveCycle};
pub use crate::slave::Slave;
pub use crate::master::{Master, Masters, Cyclic, Stage};

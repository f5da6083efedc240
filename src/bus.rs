/*!
	This module provide the trait [Fieldbus], implemented by the EtherCAT master library driving one network interface.

	The library owns the wire protocol: frame assembly, the slaves' state machines, mailbox transfers and the distributed clock registers. This crate only drives it through the calls below, in three phases:

	- setup, before activation: slave configurations, mailbox commands, layouts, entry registration. Calls may block.
	- activation: the application time is given and the domain is allocated.
	- cyclic, from the realtime task: receive, process, queue, send and state queries. Calls must not block.

	[crate::sim::SimBus] is an in-memory implementor for tests and demos.
*/

use crate::{
	binding::{Identity, PdoEntryReg},
	config::{DcConfig, WatchdogConfig},
	data::Offset,
	error::EthercatResult,
	mapping::SyncInfo,
	sdo::{Idn, SdoPart},
	state::{AlState, MasterState, SlaveState},
	};

/// slave configuration created in the fieldbus library
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlaveHandle(pub usize);

/**
	trait implementing access to an EtherCAT master library

	one implementor instance drives one master, the crate serializes all calls with a mutex
*/
pub trait Fieldbus: Send {
	/// create the configuration of a slave expected at the given address with the given identity
	fn slave_config(&mut self, slave: Identity) -> EthercatResult<SlaveHandle>;
	/// queue a CoE download sent when the slave is configured
	fn config_sdo(&mut self, slave: SlaveHandle, index: u16, sub: SdoPart, data: &[u8]) -> EthercatResult;
	/// queue a SoE write sent in the given state when the slave is configured
	fn config_idn(&mut self, slave: SlaveHandle, drive: u8, idn: Idn, state: AlState, data: &[u8]) -> EthercatResult;
	/// set the distributed clock activation and sync signals
	fn config_dc(&mut self, slave: SlaveHandle, dc: &DcConfig) -> EthercatResult;
	/// set the process data watchdog
	fn config_watchdog(&mut self, slave: SlaveHandle, watchdog: &WatchdogConfig) -> EthercatResult;
	/// set the sync managers and PDO mapping
	fn config_pdos(&mut self, slave: SlaveHandle, layout: &[SyncInfo]) -> EthercatResult;
	/**
		register PDO entries in the master's domain

		returns one offset per record, in the same order. This is called once for all slaves of a master.
	*/
	fn register_pdo_entries(&mut self, entries: &[PdoEntryReg]) -> EthercatResult<Vec<Offset>>;

	/// blocking CoE download, only allowed during setup
	fn sdo_download(&mut self, slave: Identity, index: u16, sub: SdoPart, data: &[u8]) -> EthercatResult;
	/// blocking CoE upload, only allowed during setup, returns the number of bytes read
	fn sdo_upload(&mut self, slave: Identity, index: u16, sub: SdoPart, data: &mut [u8]) -> EthercatResult<usize>;

	/// set the application time in nanoseconds since 2000-01-01, used as reference for distributed clocks
	fn application_time(&mut self, time: u64);
	/// switch the master to operation and allocate the domain, returns the process data size
	fn activate(&mut self) -> EthercatResult<usize>;
	/// stop operation, the process data is not valid anymore
	fn deactivate(&mut self);
	/// release the master, nothing can be called after
	fn release(&mut self);

	/// fetch the received frames
	fn receive(&mut self);
	/// copy received data into the process data
	fn process(&mut self, data: &mut [u8]);
	/// copy the process data into the frames to send
	fn queue(&mut self, data: &[u8]);
	/// send the queued frames
	fn send(&mut self);

	/// state of the whole master
	fn master_state(&mut self) -> MasterState;
	/// state of one slave
	fn slave_state(&mut self, slave: SlaveHandle) -> SlaveState;

	/// queue a write of the application time to the reference clock
	fn sync_reference_clock(&mut self);
	/// queue the propagation of the reference clock to all other slaves
	fn sync_slave_clocks(&mut self);
	/// lower 32 bits of the reference clock time as received in the last frame, `None` if it could not be read
	fn reference_clock_time(&mut self) -> Option<u32>;
}

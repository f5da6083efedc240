/*!
	This module provide the bounded builder describing how a slave maps its PDOs to sync managers.

	A slave declares its sync managers, the PDOs in each, and the entries in each PDO. The result is submitted once to the fieldbus library when the slave is configured, there is no re-layout at runtime.

	Example

	```
	# use ethercycle::{EthercatResult, mapping::{SyncBuilder, SyncDirection, WatchdogMode}};
	# fn main() -> EthercatResult {
	let mut syncs = SyncBuilder::new();
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Default)?;
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Enable)?;
		syncs.add_pdo(0x1600)?;
			syncs.add_entry(0x7000, 0x01, 16)?;
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
		syncs.add_pdo(0x1a00)?;
			syncs.add_entry(0x6000, 0x01, 1)?;
	let layout = syncs.finish();
	assert_eq!(layout.len(), 4);
	# Ok(())
	# }
	```

	With an [AutoFlow] policy, entries added past the per-PDO limit land in a new PDO whose index is incremented, so drivers can push a variable number of entries without counting them.
*/

use crate::error::{EthercatError, EthercatResult};

/// maximum number of sync managers per slave
pub const MAX_SYNC_COUNT: usize = 4;
/// maximum number of PDOs per slave
pub const MAX_PDO_INFO_COUNT: usize = 16;
/// maximum number of PDO entries per slave
pub const MAX_PDO_ENTRY_COUNT: usize = 128;

/// direction of the data in a sync manager, seen from the master
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncDirection {
	/// master to slave
	Output,
	/// slave to master
	Input,
}

/// watchdog mode of a sync manager
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum WatchdogMode {
	/// keep the slave's default
	#[default]
	Default,
	Enable,
	Disable,
}

/// one entry of a PDO
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdoEntryInfo {
	pub index: u16,
	pub subindex: u8,
	pub bit_length: u8,
}

/// one PDO and its entries
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PdoInfo {
	pub index: u16,
	pub entries: Vec<PdoEntryInfo>,
}

/// one sync manager and its PDOs
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncInfo {
	pub index: u8,
	pub direction: SyncDirection,
	pub watchdog: WatchdogMode,
	pub pdos: Vec<PdoInfo>,
}
impl SyncInfo {
	/// size in bits of the process data exchanged through this sync manager
	pub fn bit_size(&self) -> usize {
		self.pdos.iter()
			.flat_map(|pdo| pdo.entries.iter())
			.map(|entry| entry.bit_length as usize)
			.sum()
	}
}

/**
	policy splitting PDOs that grow past a device-specific size

	`entry_limit` entries per PDO, `pdo_limit` PDOs per sync manager, and each overflow PDO takes the index of the previous one plus `increment`
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AutoFlow {
	pub entry_limit: usize,
	pub pdo_limit: usize,
	pub increment: u16,
}

#[derive(Copy, Clone, Debug)]
struct SyncDraft {
	index: u8,
	direction: SyncDirection,
	watchdog: WatchdogMode,
	/// index of the first pdo in the pdo pool, the sync owns all pdos up to the next sync's first
	first_pdo: usize,
}
#[derive(Copy, Clone, Debug)]
struct PdoDraft {
	index: u16,
	/// index of the first entry in the entry pool
	first_entry: usize,
}

/**
	staging structure accumulating the layout of one slave

	all elements are kept in fixed capacity pools, so a device cannot grow a layout beyond what the fieldbus library accepts for one slave.
	Elements are always added to the last sync manager and the last PDO.
*/
#[derive(Clone, Debug)]
pub struct SyncBuilder {
	syncs: heapless::Vec<SyncDraft, MAX_SYNC_COUNT>,
	pdos: heapless::Vec<PdoDraft, MAX_PDO_INFO_COUNT>,
	entries: heapless::Vec<PdoEntryInfo, MAX_PDO_ENTRY_COUNT>,
	entry_limit: usize,
	pdo_limit: usize,
	autoflow: Option<AutoFlow>,
}
impl Default for SyncBuilder {
	fn default() -> Self  {Self::new()}
}
impl SyncBuilder {
	/// builder only bounded by the pool capacities
	pub fn new() -> Self {
		Self {
			syncs: heapless::Vec::new(),
			pdos: heapless::Vec::new(),
			entries: heapless::Vec::new(),
			entry_limit: MAX_PDO_ENTRY_COUNT,
			pdo_limit: MAX_PDO_INFO_COUNT,
			autoflow: None,
		}
	}
	/// builder refusing more than `entry_limit` entries per PDO and `pdo_limit` PDOs per sync manager
	pub fn with_limits(entry_limit: usize, pdo_limit: usize) -> Self {
		Self {
			entry_limit,
			pdo_limit,
			.. Self::new()
		}
	}
	/// builder splitting overflowing PDOs according to the given policy
	pub fn with_autoflow(policy: AutoFlow) -> Self {
		Self {
			entry_limit: policy.entry_limit,
			pdo_limit: policy.pdo_limit,
			autoflow: Some(policy),
			.. Self::new()
		}
	}

	/// change the splitting policy for the elements added after
	pub fn set_autoflow(&mut self, policy: AutoFlow) {
		self.entry_limit = policy.entry_limit;
		self.pdo_limit = policy.pdo_limit;
		self.autoflow = Some(policy);
	}

	/// start a new sync manager, its index is its position in the slave
	pub fn add_sync(&mut self, direction: SyncDirection, watchdog: WatchdogMode) -> EthercatResult {
		let draft = SyncDraft {
			index: self.syncs.len() as u8,
			direction,
			watchdog,
			first_pdo: self.pdos.len(),
		};
		self.syncs.push(draft)
			.map_err(|_| EthercatError::Config("too many sync managers"))
	}

	/// add a PDO to the current sync manager
	pub fn add_pdo(&mut self, index: u16) -> EthercatResult {
		let sync = self.syncs.last()
			.ok_or(EthercatError::Config("no sync manager to add a pdo to"))?;
		if self.pdos.len() - sync.first_pdo >= self.pdo_limit
			{return Err(EthercatError::Config("too many pdos in sync manager"))}
		let draft = PdoDraft {
			index,
			first_entry: self.entries.len(),
		};
		self.pdos.push(draft)
			.map_err(|_| EthercatError::Config("too many pdos"))
	}

	/// add an entry to the current PDO, opening a new PDO first if the autoflow policy requires it
	pub fn add_entry(&mut self, index: u16, subindex: u8, bit_length: u8) -> EthercatResult {
		let sync = *self.syncs.last()
			.ok_or(EthercatError::Config("no sync manager to add an entry to"))?;
		let pdo = match self.pdos.last() {
			Some(pdo) if self.pdos.len() > sync.first_pdo => *pdo,
			_ => return Err(EthercatError::Config("no pdo to add an entry to")),
		};
		if self.entries.len() - pdo.first_entry >= self.entry_limit {
			match self.autoflow {
				Some(policy) => self.add_pdo(pdo.index.wrapping_add(policy.increment))?,
				None => return Err(EthercatError::Config("too many entries in pdo")),
			}
		}
		self.entries.push(PdoEntryInfo {index, subindex, bit_length})
			.map_err(|_| EthercatError::Config("too many pdo entries"))
	}

	/// number of entries added so far
	pub fn entry_count(&self) -> usize  {self.entries.len()}

	/// produce the final layout, sync managers in declaration order
	pub fn finish(&self) -> Vec<SyncInfo> {
		self.syncs.iter().enumerate().map(|(i, sync)| {
			let pdo_end = self.syncs.get(i+1)
				.map(|next| next.first_pdo)
				.unwrap_or(self.pdos.len());
			SyncInfo {
				index: sync.index,
				direction: sync.direction,
				watchdog: sync.watchdog,
				pdos: (sync.first_pdo .. pdo_end).map(|p| {
					let entry_end = self.pdos.get(p+1)
						.map(|next| next.first_entry)
						.unwrap_or(self.entries.len());
					PdoInfo {
						index: self.pdos[p].index,
						entries: self.entries[self.pdos[p].first_entry .. entry_end].to_vec(),
					}
				}).collect(),
			}
		}).collect()
	}
}

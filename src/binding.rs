/*!
	two-phase binding of PDO entries to the process data buffer

	During setup a device *declares* the entries it wants to access and keeps the returned [PdoHandle]. The declarations of all slaves of a master are concatenated and submitted once to the fieldbus library, which computes the actual process data layout and returns one [Offset] per declaration. Those offsets can only be dereferenced through a cycle context, which does not exist before the master is activated.

	Declaring twice the same `(index, subindex)` on the same slave returns the handle of the first declaration, so channels packed in one wide entry share a single registration.
*/

use crate::{
	data::Offset,
	error::{EthercatError, EthercatResult},
	};

/// maximum number of distinct entries a slave may declare
pub const MAX_PDO_REG_COUNT: usize = 256;

/// identity and bus position of a slave, as needed to address it in the fieldbus library
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Identity {
	pub alias: u16,
	pub position: u16,
	pub vendor: u32,
	pub product: u32,
}

/// registration record as submitted to the fieldbus library
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdoEntryReg {
	pub slave: Identity,
	pub index: u16,
	pub subindex: u8,
}

/// opaque reference to a declared entry, it is only meaningful for the slave that declared it
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PdoHandle(usize);

/// accumulating list of entries declared by one slave
#[derive(Clone, Debug, Default)]
pub struct Registrations {
	records: Vec<PdoEntryReg>,
	/// resolved offsets, empty until the master registered its entries
	offsets: Vec<Offset>,
}
impl Registrations {
	pub fn new() -> Self  {Self::default()}

	/**
		declare an entry and return its handle

		the handle is not usable until the registrations are resolved
	*/
	pub fn declare(&mut self, slave: Identity, index: u16, subindex: u8) -> EthercatResult<PdoHandle> {
		if ! self.offsets.is_empty()
			{return Err(EthercatError::Master("entries already registered"))}
		if let Some(existing) = self.records.iter()
				.position(|record| record.index == index && record.subindex == subindex)
			{return Ok(PdoHandle(existing))}
		if self.records.len() >= MAX_PDO_REG_COUNT
			{return Err(EthercatError::Config("too many pdo entry registrations"))}
		self.records.push(PdoEntryReg {slave, index, subindex});
		Ok(PdoHandle(self.records.len() - 1))
	}

	pub fn len(&self) -> usize  {self.records.len()}
	pub fn is_empty(&self) -> bool  {self.records.is_empty()}
	/// records in declaration order, as they must be submitted
	pub fn records(&self) -> &[PdoEntryReg]  {&self.records}
	pub fn is_resolved(&self) -> bool  {self.offsets.len() == self.records.len() && ! self.records.is_empty()}

	/// store the offsets returned by the fieldbus library, in declaration order
	pub(crate) fn resolve(&mut self, offsets: &[Offset]) -> EthercatResult {
		if offsets.len() != self.records.len()
			{return Err(EthercatError::Protocol("registration returned a wrong number of offsets"))}
		self.offsets = offsets.to_vec();
		Ok(())
	}
	/// forget resolved offsets, they are not valid anymore after deactivation
	pub(crate) fn invalidate(&mut self) {
		self.offsets.clear();
	}

	/// resolved offset of a declared entry
	pub fn offset(&self, handle: PdoHandle) -> Option<Offset> {
		self.offsets.get(handle.0).copied()
	}
	/// record of a declared entry
	pub fn record(&self, handle: PdoHandle) -> Option<&PdoEntryReg> {
		self.records.get(handle.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_redeclaration() {
		let slave = Identity {position: 3, vendor: 2, product: 0x1234, .. Default::default()};
		let mut regs = Registrations::new();
		let a = regs.declare(slave, 0x6000, 1).unwrap();
		let b = regs.declare(slave, 0x6000, 2).unwrap();
		let c = regs.declare(slave, 0x6000, 1).unwrap();
		assert_eq!(a, c);
		assert_ne!(a, b);
		assert_eq!(regs.len(), 2);
		assert_eq!(regs.offset(a), None);

		regs.resolve(&[Offset::new(4, 0), Offset::new(6, 0)]).unwrap();
		assert_eq!(regs.offset(c), Some(Offset::new(4, 0)));
		assert!(regs.declare(slave, 0x7000, 1).is_err());
		regs.invalidate();
		assert_eq!(regs.offset(a), None);
	}

	#[test]
	fn bounded_registrations() {
		let mut regs = Registrations::new();
		for i in 0 .. MAX_PDO_REG_COUNT {
			regs.declare(Identity::default(), 0x6000 + i as u16, 1).unwrap();
		}
		assert!(regs.declare(Identity::default(), 0x5000, 1).is_err());
		// still accepted since merged
		assert!(regs.declare(Identity::default(), 0x6000, 1).is_ok());
	}
}

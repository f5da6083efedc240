/*!
	one-time mailbox configuration of slaves

	Slaves configured through CoE or SoE get an ordered list of [InitCommand], queued to the fieldbus library when the slave is configured and sent by it during the transition to [AlState::PreOperational]. Nothing here runs in the cyclic task.
*/

use crate::state::AlState;
use core::fmt;

/// part of an SDO to access
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SdoPart {
	/// all subitems of the SDO at once (complete access)
	Complete,
	/// one subitem only
	Sub(u8),
}
impl SdoPart {
	/// subindex to send on the wire, complete access starts at 0
	pub fn subindex(&self) -> u8 {
		match self {
			Self::Complete => 0,
			Self::Sub(sub) => *sub,
		}
	}
}

/// kind of a SoE parameter, S for standard, P for product specific
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdnKind {
	S,
	P,
}

/**
	identification number of a SoE parameter

	bit 15 is the kind, bits 12..15 the parameter set, bits 0..12 the data block
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Idn(pub u16);
impl Idn {
	pub const fn new(kind: IdnKind, set: u8, block: u16) -> Self {
		let kind = match kind {
			IdnKind::S => 0x0000,
			IdnKind::P => 0x8000,
		};
		Self(kind | ((set as u16 & 0x07) << 12) | (block & 0x0fff))
	}
	pub const fn kind(&self) -> IdnKind {
		if self.0 & 0x8000 != 0  {IdnKind::P}
		else                     {IdnKind::S}
	}
	pub const fn set(&self) -> u8  {((self.0 >> 12) & 0x07) as u8}
	pub const fn block(&self) -> u16  {self.0 & 0x0fff}
}
impl fmt::Display for Idn {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}-{}-{:04}", self.kind(), self.set(), self.block())
	}
}

/// one mailbox configuration command, sent once before operation
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InitCommand {
	/// CoE download
	Sdo {
		index: u16,
		sub: SdoPart,
		data: Vec<u8>,
	},
	/// SoE write, performed in the given AL state
	Idn {
		drive: u8,
		idn: Idn,
		state: AlState,
		data: Vec<u8>,
	},
}
impl InitCommand {
	pub fn sdo(index: u16, sub: SdoPart, data: impl Into<Vec<u8>>) -> Self {
		Self::Sdo {index, sub, data: data.into()}
	}
	pub fn idn(drive: u8, idn: Idn, state: AlState, data: impl Into<Vec<u8>>) -> Self {
		Self::Idn {drive, idn, state, data: data.into()}
	}
}
impl fmt::Display for InitCommand {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Sdo {index, sub: SdoPart::Complete, data} =>
				write!(f, "sdo {:04x} complete ({} bytes)", index, data.len()),
			Self::Sdo {index, sub: SdoPart::Sub(sub), data} =>
				write!(f, "sdo {:04x}:{:02x} ({} bytes)", index, sub, data.len()),
			Self::Idn {drive, idn, state, data} =>
				write!(f, "idn {} drive {} in {:?} ({} bytes)", idn, drive, state, data.len()),
		}
	}
}

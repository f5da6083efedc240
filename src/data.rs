//! Traits and impls used to read/write values in the process data buffer.

use core::fmt;

/**
	trait for data types than can be packed/unpacked to/from process data

	all values are exchanged in little endian, as on the wire
*/
pub trait PduData: Sized + Copy {
    const ID: TypeId;
    /// number of bytes occupied in process data
    const LEN: usize;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()>;
    fn unpack(src: &[u8]) -> PackingResult<Self>;

    fn packed_size() -> usize  {Self::LEN}
    fn packed_bitsize() -> usize {Self::LEN*8}
}

/** Enum to identify and raise adapted error raised by this package
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PackingError {
    BadSize(usize, &'static str),
    InvalidValue(&'static str),
}

pub type PackingResult<T> = Result<T, PackingError>;

/** dtype identifiers associated to dtypes allowing to dynamically check the type of a [PduData] implementor

	It is only convering the common useful types and not all the possible implementors of [PduData]
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypeId {
	BOOL,
	I8, I16, I32, I64,
	U8, U16, U32, U64,
	F32, F64,
}

impl PduData for bool {
	const ID: TypeId = TypeId::BOOL;
	const LEN: usize = 1;

	fn pack(&self, dst: &mut [u8]) -> PackingResult<()>  {
        if dst.len() < Self::LEN
            {return Err(PackingError::BadSize(dst.len(), "no byte for bool"))}
        dst[0] = if *self {0b1} else {0b0};
        Ok(())
	}
	fn unpack(src: &[u8]) -> PackingResult<Self>  {
        if src.len() < Self::LEN
            {return Err(PackingError::BadSize(src.len(), "no byte for bool"))}
		Ok(src[0] & 0b1 == 0b1)
	}
}

/// macro implementing [PduData] for numeric types
macro_rules! num_pdudata {
	($t: ty, $id: ident) => { impl PduData for $t {
			const ID: TypeId = TypeId::$id;
			const LEN: usize = core::mem::size_of::<$t>();

            fn pack(&self, dst: &mut [u8]) -> PackingResult<()> {
                if dst.len() < Self::LEN
                    {return Err(PackingError::BadSize(dst.len(), "not enough bytes for number"))}
				dst[.. Self::LEN].copy_from_slice(&self.to_le_bytes());
				Ok(())
			}
			fn unpack(src: &[u8]) -> PackingResult<Self> {
                if src.len() < Self::LEN
                    {return Err(PackingError::BadSize(src.len(), "not enough bytes for number"))}
                let mut bytes = [0; core::mem::size_of::<$t>()];
                bytes.copy_from_slice(&src[.. Self::LEN]);
				Ok(Self::from_le_bytes(bytes))
			}
		}};
}

num_pdudata!(u8, U8);
num_pdudata!(u16, U16);
num_pdudata!(u32, U32);
num_pdudata!(u64, U64);
num_pdudata!(i8, I8);
num_pdudata!(i16, I16);
num_pdudata!(i32, I32);
num_pdudata!(i64, I64);
num_pdudata!(f32, F32);
num_pdudata!(f64, F64);


/**
	location of a PDO entry in the process data buffer, as computed by the fieldbus library at registration

	`bit` is only meaningful for entries that do not start on a byte boundary
*/
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Offset {
	/// start byte index of the entry
	pub byte: usize,
	/// bit position of the entry start in its first byte
	pub bit: u8,
}
impl Offset {
	pub const fn new(byte: usize, bit: u8) -> Self {
		Self{byte, bit}
	}
	/**
		locate a boolean channel packed at bit `bit` of the wider entry starting at this offset

		The byte offset is advanced by whole bytes and the bit position replaced, data being little endian.
	*/
	pub const fn packed(self, bit: u16) -> Self {
		Self {
			byte: self.byte + (bit >> 3) as usize,
			bit: (bit & 7) as u8,
		}
	}
}
impl fmt::Display for Offset {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}.{}", self.byte, self.bit)
	}
}

/**
	the process data image of one master

	It is sized by the fieldbus library at activation, and is rewritten each cycle by the bus (inputs) and the device write hooks (outputs). Nothing should keep an offset into it across a reactivation.
*/
#[derive(Clone, Debug, Default)]
pub struct ProcessData {
	data: Vec<u8>,
}
impl ProcessData {
	/// zero-filled buffer of the given size
	pub fn new(size: usize) -> Self {
		Self {data: vec![0; size]}
	}
	pub fn len(&self) -> usize  {self.data.len()}
	pub fn is_empty(&self) -> bool  {self.data.is_empty()}
	pub fn as_slice(&self) -> &[u8]  {&self.data}
	pub fn as_mut_slice(&mut self) -> &mut [u8]  {&mut self.data}

	fn tail(&self, byte: usize) -> PackingResult<&[u8]> {
		self.data.get(byte ..)
			.ok_or(PackingError::BadSize(self.data.len(), "offset out of process data"))
	}
	fn tail_mut(&mut self, byte: usize) -> PackingResult<&mut [u8]> {
		let len = self.data.len();
		self.data.get_mut(byte ..)
			.ok_or(PackingError::BadSize(len, "offset out of process data"))
	}

	/// extract a byte-aligned value starting at the given offset
	pub fn get<T: PduData>(&self, offset: Offset) -> PackingResult<T> {
		T::unpack(self.tail(offset.byte)?)
	}
	/// dump a byte-aligned value starting at the given offset
	pub fn set<T: PduData>(&mut self, offset: Offset, value: T) -> PackingResult<()> {
		value.pack(self.tail_mut(offset.byte)?)
	}

	/// read the single bit at the given offset
	pub fn bit(&self, offset: Offset) -> PackingResult<bool> {
		let byte = self.tail(offset.byte)?
			.first()
			.ok_or(PackingError::BadSize(0, "offset out of process data"))?;
		Ok(*byte >> (offset.bit & 7) & 1 == 1)
	}
	/// write the single bit at the given offset, leaving its neighbours untouched
	pub fn set_bit(&mut self, offset: Offset, value: bool) -> PackingResult<()> {
		let byte = self.tail_mut(offset.byte)?
			.first_mut()
			.ok_or(PackingError::BadSize(0, "offset out of process data"))?;
		let mask = 1 << (offset.bit & 7);
		if value  {*byte |= mask}
		else      {*byte &= !mask}
		Ok(())
	}

	/// read `len` bits (at most 64) starting at the given offset, as an unsigned little endian integer
	pub fn bits(&self, offset: Offset, len: u8) -> PackingResult<u64> {
		if len > 64
			{return Err(PackingError::InvalidValue("bit range wider than 64 bits"))}
		let start = offset.byte * 8 + offset.bit as usize;
		let mut value = 0;
		for i in 0 .. len as usize {
			let position = start + i;
			if self.bit(Offset::new(position / 8, (position % 8) as u8))?
				{value |= 1 << i}
		}
		Ok(value)
	}
	/// write the `len` lowest bits (at most 64) of `value` starting at the given offset
	pub fn set_bits(&mut self, offset: Offset, len: u8, value: u64) -> PackingResult<()> {
		if len > 64
			{return Err(PackingError::InvalidValue("bit range wider than 64 bits"))}
		let start = offset.byte * 8 + offset.bit as usize;
		for i in 0 .. len as usize {
			let position = start + i;
			self.set_bit(Offset::new(position / 8, (position % 8) as u8), value >> i & 1 == 1)?;
		}
		Ok(())
	}
}

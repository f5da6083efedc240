/*!
	registry of the device types known to the crate

	Every device module exposes a static table of [DeviceType], and [Registry::builtin] registers all compiled-in tables at startup. Lookup is by type name, the first registered type with a given name wins. The name [GENERIC] is reserved for slaves whose layout is fully given by configuration.
*/

use crate::{
	device::{Device, SlaveSetup},
	error::EthercatResult,
	slave::Slave,
	};
use core::fmt;

/// type name of slaves described entirely by configuration
pub const GENERIC: &str = "generic";

/// hook run before any slave is initialized
pub type PreinitHook = fn(&mut Slave) -> EthercatResult;
/// hook declaring the slave layout and building its device object
pub type InitHook = fn(&mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>>;

/// descriptor of one supported device type
#[derive(Copy, Clone)]
pub struct DeviceType {
	/// unique name used in configuration
	pub name: &'static str,
	pub vendor: u32,
	pub product: u32,
	/// device-private value passed unchanged to init
	pub flags: u64,
	/// option schemas accepted by this device, concatenated in order
	pub modparams: &'static [&'static [ModParamDesc]],
	/// the device is a FSoE logic, preinitialized after all the others
	pub fsoe_logic: bool,
	pub preinit: Option<PreinitHook>,
	pub init: InitHook,
}
impl DeviceType {
	pub const fn new(name: &'static str, vendor: u32, product: u32, init: InitHook) -> Self {
		Self {
			name,
			vendor,
			product,
			flags: 0,
			modparams: &[],
			fsoe_logic: false,
			preinit: None,
			init,
		}
	}
	pub const fn flags(mut self, flags: u64) -> Self {
		self.flags = flags;
		self
	}
	pub const fn modparams(mut self, modparams: &'static [&'static [ModParamDesc]]) -> Self {
		self.modparams = modparams;
		self
	}
	pub const fn preinit(mut self, preinit: PreinitHook) -> Self {
		self.preinit = Some(preinit);
		self
	}
	pub const fn fsoe_logic(mut self) -> Self {
		self.fsoe_logic = true;
		self
	}
	/// complete option schema of this device type
	pub fn schema(&self) -> Vec<ModParamDesc> {
		concat(self.modparams)
	}
}
impl fmt::Debug for DeviceType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("DeviceType")
			.field("name", &self.name)
			.field("vendor", &format_args!("{:#010x}", self.vendor))
			.field("product", &format_args!("{:#010x}", self.product))
			.field("flags", &format_args!("{:#x}", self.flags))
			.finish()
	}
}

/// type of a configuration option
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModParamType {
	Bit,
	U32,
	S32,
	Float,
	String,
}

/// value of a configuration option
#[derive(Clone, Debug, PartialEq)]
pub enum ModParamValue {
	Bit(bool),
	U32(u32),
	S32(i32),
	Float(f64),
	String(String),
}
impl ModParamValue {
	pub fn bit(&self) -> Option<bool>  {match self {Self::Bit(v) => Some(*v), _ => None}}
	pub fn u32(&self) -> Option<u32>  {match self {Self::U32(v) => Some(*v), _ => None}}
	pub fn s32(&self) -> Option<i32>  {match self {Self::S32(v) => Some(*v), _ => None}}
	pub fn float(&self) -> Option<f64>  {match self {Self::Float(v) => Some(*v), _ => None}}
	pub fn string(&self) -> Option<&str>  {match self {Self::String(v) => Some(v), _ => None}}
}

/// declaration of a configuration option accepted by a device
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModParamDesc {
	pub name: &'static str,
	/// identifier used by the device to find the option back
	pub id: u32,
	pub kind: ModParamType,
}
impl ModParamDesc {
	pub const fn new(name: &'static str, id: u32, kind: ModParamType) -> Self {
		Self {name, id, kind}
	}
	/// parse a raw value, `None` if it is not valid for this option
	pub fn parse(&self, text: &str) -> Option<ModParamValue> {
		let text = text.trim();
		Some(match self.kind {
			ModParamType::Bit => ModParamValue::Bit(match text {
				"1" | "true" | "on" => true,
				"0" | "false" | "off" => false,
				_ => return None,
			}),
			ModParamType::U32 => ModParamValue::U32(parse_int(text)?.try_into().ok()?),
			ModParamType::S32 => ModParamValue::S32(parse_int(text)?.try_into().ok()?),
			ModParamType::Float => ModParamValue::Float(text.parse().ok()?),
			ModParamType::String => ModParamValue::String(text.into()),
		})
	}
}

/// decimal or `0x` prefixed hexadecimal integer
fn parse_int(text: &str) -> Option<i64> {
	let (negative, digits) = match text.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, text),
	};
	let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
		Some(hex) => i64::from_str_radix(hex, 16).ok()?,
		None => digits.parse::<i64>().ok()?,
	};
	Some(if negative {-value} else {value})
}

/// concatenate option schemas, in order
pub fn concat(lists: &[&[ModParamDesc]]) -> Vec<ModParamDesc> {
	lists.iter().flat_map(|list| list.iter().copied()).collect()
}

/// configuration option of one slave, validated against its device schema
#[derive(Clone, Debug, PartialEq)]
pub struct ModParam {
	pub id: u32,
	pub name: String,
	pub value: ModParamValue,
}

/// lookup table of device types
#[derive(Clone, Debug, Default)]
pub struct Registry {
	types: Vec<&'static DeviceType>,
}
impl Registry {
	/// empty registry
	pub fn new() -> Self  {Self::default()}
	/// registry with all the device types compiled in this crate
	pub fn builtin() -> Self {
		let mut registry = Self::new();
		for table in crate::devices::TABLES {
			registry.register_all(table);
		}
		registry
	}
	/// add one device type, a name already present is not replaced
	pub fn register(&mut self, kind: &'static DeviceType) {
		if self.find(kind.name).is_some()
			{log::debug!("device type {} registered twice, keeping the first", kind.name)}
		self.types.push(kind);
	}
	/// add all device types of a table, in order
	pub fn register_all(&mut self, table: &'static [DeviceType]) {
		for kind in table {
			self.register(kind);
		}
	}
	/// first device type registered with this name
	pub fn find(&self, name: &str) -> Option<&'static DeviceType> {
		self.types.iter().copied().find(|kind| kind.name == name)
	}
	pub fn len(&self) -> usize  {self.types.len()}
	pub fn is_empty(&self) -> bool  {self.types.is_empty()}
	pub fn iter(&self) -> impl Iterator<Item=&'static DeviceType> + '_  {self.types.iter().copied()}
}

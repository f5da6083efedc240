/*!
	Beckhoff EL41x2 two-channel 16 bit analog output terminals

	Each channel converts a value to a duty cycle in `[-1, 1]` with `dc = value / scale + offset`, clamped to the channel's limits, then to the raw signed output `0x7fff * dc`.
*/

use super::din::BECKHOFF_VID;
use crate::{
	binding::PdoHandle,
	device::{Device, SlaveCycle, SlaveSetup},
	error::EthercatResult,
	mapping::{SyncBuilder, SyncDirection, WatchdogMode},
	pins::{PinDir, BitPin, S32Pin, FloatPin},
	registry::DeviceType,
	};

/// number of channels of all EL41x2 terminals
pub const CHANNELS: u16 = 2;

pub const TYPES: &[DeviceType] = &[
	DeviceType::new("EL4102", BECKHOFF_VID, 0x10063052, init),
	DeviceType::new("EL4112", BECKHOFF_VID, 0x10103052, init),
	DeviceType::new("EL4122", BECKHOFF_VID, 0x101A3052, init),
	DeviceType::new("EL4132", BECKHOFF_VID, 0x10243052, init),
	DeviceType::new("EJ4132", BECKHOFF_VID, 0x10242852, init),
	];

struct Channel {
	output: PdoHandle,
	scale: FloatPin,
	offset: FloatPin,
	min_dc: FloatPin,
	max_dc: FloatPin,
	curr_dc: FloatPin,
	enable: BitPin,
	absmode: BitPin,
	value: FloatPin,
	raw: S32Pin,
	pos: BitPin,
	neg: BitPin,
	/// scale the reciprocal was computed for
	old_scale: f64,
	scale_recip: f64,
}

impl Channel {
	fn new(setup: &mut SlaveSetup<'_>, index: u16) -> EthercatResult<Self> {
		let name = |pin: &str| format!("aout-{}-{}", index, pin);
		let channel = Self {
			output: setup.declare(0x3001 + index, 1)?,
			scale: setup.float_pin(PinDir::Io, &name("scale"))?,
			offset: setup.float_pin(PinDir::Io, &name("offset"))?,
			min_dc: setup.float_pin(PinDir::Io, &name("min-dc"))?,
			max_dc: setup.float_pin(PinDir::Io, &name("max-dc"))?,
			curr_dc: setup.float_pin(PinDir::Out, &name("curr-dc"))?,
			enable: setup.bit_pin(PinDir::In, &name("enable"))?,
			absmode: setup.bit_pin(PinDir::In, &name("absmode"))?,
			value: setup.float_pin(PinDir::In, &name("value"))?,
			raw: setup.s32_pin(PinDir::Out, &name("raw"))?,
			pos: setup.bit_pin(PinDir::Out, &name("pos"))?,
			neg: setup.bit_pin(PinDir::Out, &name("neg"))?,
			old_scale: 2.,
			scale_recip: 1.,
		};
		channel.scale.set(1.);
		channel.min_dc.set(-1.);
		channel.max_dc.set(1.);
		Ok(channel)
	}

	/// raw output of this cycle, also updating the pins
	fn compute(&mut self) -> i16 {
		// duty cycle limits stay in [-1, 1] with min <= max
		if self.max_dc.get() > 1.  {self.max_dc.set(1.)}
		if self.min_dc.get() > self.max_dc.get()  {self.min_dc.set(self.max_dc.get())}
		if self.min_dc.get() < -1.  {self.min_dc.set(-1.)}
		if self.max_dc.get() < self.min_dc.get()  {self.max_dc.set(self.min_dc.get())}

		if self.scale.get() != self.old_scale {
			if self.scale.get().abs() < 1e-20
				{self.scale.set(1.)}
			self.old_scale = self.scale.get();
			self.scale_recip = 1. / self.old_scale;
		}

		let mut value = self.value.get();
		if self.absmode.get() && value < 0.
			{value = -value}
		let dc = (value * self.scale_recip + self.offset.get())
			.max(self.min_dc.get())
			.min(self.max_dc.get());

		let raw =
			if ! self.enable.get() {
				self.pos.set(false);
				self.neg.set(false);
				self.curr_dc.set(0.);
				0.
			}
			else {
				self.pos.set(self.value.get() > 0.);
				self.neg.set(self.value.get() < 0.);
				self.curr_dc.set(dc);
				(dc * 0x7fff as f64).clamp(-0x7fff as f64, 0x7fff as f64)
			};
		self.raw.set(raw as i32);
		raw as i16
	}
}

struct El41x2 {
	channels: Vec<Channel>,
}
impl Device for El41x2 {
	fn write(&mut self, cycle: &mut SlaveCycle<'_>) {
		for channel in self.channels.iter_mut() {
			let raw = channel.compute();
			cycle.set(channel.output, raw);
		}
	}
}

fn init(setup: &mut SlaveSetup<'_>) -> EthercatResult<Box<dyn Device>> {
	let mut syncs = SyncBuilder::new();
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Default)?;
	syncs.add_sync(SyncDirection::Input, WatchdogMode::Default)?;
	syncs.add_sync(SyncDirection::Output, WatchdogMode::Default)?;
	for i in 0 .. CHANNELS {
		syncs.add_pdo(0x1600 + i)?;
		syncs.add_entry(0x3001 + i, 1, 16)?;
	}
	setup.set_layout(syncs.finish())?;

	let channels = (0 .. CHANNELS)
		.map(|i| Channel::new(setup, i))
		.collect::<EthercatResult<Vec<_>>>()?;
	Ok(Box::new(El41x2 {channels}))
}

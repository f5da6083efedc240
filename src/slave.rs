/*!
	the slaves of a master, from configuration to cyclic exchange

	A [Slave] is created from a [SlaveConfig] bound to a device type of the [Registry], or to the generic device when its type is [GENERIC]. It is owned by exactly one master, which drives it through startup and cycles.
*/

use crate::{
	binding::{Identity, Registrations},
	bus::{Fieldbus, SlaveHandle},
	config::{SlaveConfig, DcConfig, WatchdogConfig},
	device::{Device, SlaveSetup},
	devices::generic::{self, GenericSync},
	error::{EthercatError, EthercatResult},
	mapping::SyncInfo,
	pins::{PinTable, SlaveStatePins, MODULE_NAME},
	registry::{Registry, DeviceType, ModParam, GENERIC, PreinitHook, InitHook},
	sdo::InitCommand,
	state::SlaveState,
	};

/// device implementation a slave is bound to
#[derive(Copy, Clone, Debug)]
pub enum Binding {
	/// layout and pins given by configuration
	Generic,
	/// device type from the registry
	Typed(&'static DeviceType),
}
impl Binding {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Generic => GENERIC,
			Self::Typed(kind) => kind.name,
		}
	}
	pub fn fsoe_logic(&self) -> bool {
		match self {
			Self::Generic => false,
			Self::Typed(kind) => kind.fsoe_logic,
		}
	}
	pub fn preinit(&self) -> Option<PreinitHook> {
		match self {
			Self::Generic => None,
			Self::Typed(kind) => kind.preinit,
		}
	}
	pub fn init(&self) -> InitHook {
		match self {
			Self::Generic => generic::init,
			Self::Typed(kind) => kind.init,
		}
	}
}

/**
	one slave of a master

	the master keeps its slaves in configuration order, which is also the order of all setup steps and cyclic calls
*/
pub struct Slave {
	/// position in the master's slave list
	pub(crate) index: usize,
	pub(crate) name: String,
	pub(crate) identity: Identity,
	pub(crate) binding: Binding,
	pub(crate) flags: u64,
	pub(crate) modparams: Vec<ModParam>,
	pub(crate) dc: Option<DcConfig>,
	pub(crate) watchdog: Option<WatchdogConfig>,
	pub(crate) commands: Vec<InitCommand>,
	/// layout submitted to the bus, if the slave has process data
	pub(crate) layout: Option<Vec<SyncInfo>>,
	/// configured layout of a generic slave
	pub(crate) generic_layout: Vec<GenericSync>,
	pub(crate) registrations: Registrations,
	/// configuration in the fieldbus library, once created
	pub(crate) handle: Option<SlaveHandle>,
	pub(crate) device: Option<Box<dyn Device>>,
	pub(crate) state: SlaveState,
	pub(crate) pins: Option<SlaveStatePins>,
}

impl Slave {
	/**
		bind a slave configuration to its device type

		fails when the type is unknown or an option is not valid for it, such a slave should be skipped
	*/
	pub fn new(config: SlaveConfig, registry: &Registry) -> EthercatResult<Self> {
		let (binding, mut identity, flags, schema) =
			if config.kind == GENERIC {
				(Binding::Generic, Identity::default(), 0, Vec::new())
			}
			else {
				let kind = registry.find(&config.kind)
					.ok_or(EthercatError::Config("unknown device type"))?;
				(Binding::Typed(kind),
					Identity {vendor: kind.vendor, product: kind.product, .. Default::default()},
					kind.flags,
					kind.schema())
			};
		identity.alias = config.alias;
		identity.position = config.position;
		if config.vendor != 0  {identity.vendor = config.vendor}
		if config.product != 0  {identity.product = config.product}

		let mut modparams = Vec::with_capacity(config.modparams.len());
		for (name, text) in &config.modparams {
			let desc = schema.iter()
				.find(|desc| desc.name == name.as_str())
				.ok_or(EthercatError::Config("unknown option for device type"))?;
			let value = desc.parse(text)
				.ok_or(EthercatError::Config("option value out of range"))?;
			modparams.push(ModParam {id: desc.id, name: name.clone(), value});
		}

		Ok(Self {
			index: 0,
			name: config.name,
			identity,
			binding,
			flags: config.flags.unwrap_or(flags),
			modparams,
			dc: config.dc,
			watchdog: config.watchdog,
			commands: config.commands,
			layout: None,
			generic_layout: config.layout,
			registrations: Registrations::new(),
			handle: None,
			device: None,
			state: SlaveState::default(),
			pins: None,
		})
	}

	pub fn index(&self) -> usize  {self.index}
	pub fn name(&self) -> &str  {&self.name}
	pub fn identity(&self) -> Identity  {self.identity}
	pub fn binding(&self) -> Binding  {self.binding}
	pub fn flags(&self) -> u64  {self.flags}
	pub fn modparams(&self) -> &[ModParam]  {&self.modparams}
	/// value of an option by id
	pub fn modparam(&self, id: u32) -> Option<&crate::registry::ModParamValue> {
		self.modparams.iter()
			.find(|param| param.id == id)
			.map(|param| &param.value)
	}
	pub fn dc(&self) -> Option<&DcConfig>  {self.dc.as_ref()}
	pub fn watchdog(&self) -> Option<&WatchdogConfig>  {self.watchdog.as_ref()}
	pub fn commands(&self) -> &[InitCommand]  {&self.commands}
	pub fn layout(&self) -> Option<&[SyncInfo]>  {self.layout.as_deref()}
	pub fn generic_layout(&self) -> &[GenericSync]  {&self.generic_layout}
	pub fn registrations(&self) -> &Registrations  {&self.registrations}
	/// state as last polled from the bus
	pub fn state(&self) -> SlaveState  {self.state}
	/// the device object exists, so the init hook succeeded
	pub fn is_initialized(&self) -> bool  {self.device.is_some()}

	/// set the distributed clock config, a second definition is ignored
	pub fn set_dc(&mut self, dc: DcConfig) -> bool {
		if self.dc.is_some() {
			log::warn!("slave {}: distributed clock already configured, ignoring", self.name);
			return false;
		}
		self.dc = Some(dc);
		true
	}
	/// set the watchdog config, a second definition is ignored
	pub fn set_watchdog(&mut self, watchdog: WatchdogConfig) -> bool {
		if self.watchdog.is_some() {
			log::warn!("slave {}: watchdog already configured, ignoring", self.name);
			return false;
		}
		self.watchdog = Some(watchdog);
		true
	}
	/// append a mailbox command, only effective before the slave is set up
	pub fn push_command(&mut self, command: InitCommand) {
		self.commands.push(command);
	}

	/**
		configure the slave in the fieldbus library and run its device init

		in order: slave configuration, mailbox commands, device init, distributed clock, watchdog, sync managers, state pins
	*/
	pub(crate) fn setup(&mut self, bus: &mut dyn Fieldbus, pins: &mut PinTable, master: &str, period: u32) -> EthercatResult {
		let handle = bus.slave_config(self.identity)?;
		self.handle = Some(handle);
		for command in &self.commands {
			queue_command(bus, handle, command, &self.name);
		}

		let init = self.binding.init();
		let device = {
			let mut setup = SlaveSetup {
				slave: &mut *self,
				bus: &mut *bus,
				pins: &mut *pins,
				master,
				period,
			};
			init(&mut setup)?
		};
		self.device = Some(device);

		if let Some(dc) = &self.dc {
			bus.config_dc(handle, dc)?;
		}
		if let Some(watchdog) = &self.watchdog {
			bus.config_watchdog(handle, watchdog)?;
		}
		if let Some(layout) = &self.layout {
			bus.config_pdos(handle, layout)?;
		}
		self.pins = Some(SlaveStatePins::new(pins, &format!("{}.{}.{}", MODULE_NAME, master, self.name))?);
		Ok(())
	}

	/// run the device cleanup, at most once
	pub(crate) fn cleanup(&mut self) {
		if let Some(mut device) = self.device.take() {
			device.cleanup();
		}
		self.registrations.invalidate();
	}
}

/// queue one mailbox command, a failure only concerns this command
pub(crate) fn queue_command(bus: &mut dyn Fieldbus, handle: SlaveHandle, command: &InitCommand, slave: &str) {
	let result = match command {
		InitCommand::Sdo {index, sub, data} => bus.config_sdo(handle, *index, *sub, data),
		InitCommand::Idn {drive, idn, state, data} => bus.config_idn(handle, *drive, *idn, *state, data),
	};
	if let Err(e) = result {
		log::error!("slave {}: failed to queue {}: {}", slave, command, e);
	}
}

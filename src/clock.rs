/*!
	Phase lock between the realtime task and the distributed clock of the ethercat segment.

	Once a master is activated, each cycle sends an *application time* to the bus, from which the reference slave clock and then all slave clocks are synchronized. The realtime task itself is scheduled by the host, whose clock drifts from the slaves' ones. This module keeps both in a stable phase relationship, in one of two directions:

	- **master as time source** ([ClockSource::Master]): the application time follows the host monotonic clock and the reference clock is periodically written with it. The loop measures the jitter of the task phase during a calibration, then keeps the phase at a target just above the jitter.

	- **reference clock as time source** ([ClockSource::Reference]): the application time is advanced by exactly one period each cycle and compared with the reference clock read back from the bus. The loop keeps the host task trailing the reference clock.

	In both cases the controller is a bang-bang one: while unlocked it outputs a constant step toward zero error, once locked it outputs nothing. Only a manual debug offset goes through when locked. This is computed with integer arithmetic only, and wraps phases so that values around 0 and `period` compare as close.

	The controller is a strategy ([PhaseLock]) chosen when the master is created: [Disciplined] when the host scheduler supports clock correction and a [ClockConfig] is given, [Free] otherwise.
*/

use crate::{
	error::EthercatResult,
	pins::{PinTable, PinDir, BitPin, U32Pin, S32Pin},
	};

/// number of cycles measuring the task phase jitter before locking starts
pub const PHASE_MEASURE_CYCLES: u32 = 100;
/// number of consecutive cycles under threshold before declaring the phase locked
pub const LOCK_CYCLES: u32 = 100;
/// number of cycles before the drift term is applied, in [DriftMode::Simple]
pub const DRIFT_SETTLE_CYCLES: u32 = 100;
/// offset from UNIX epoch to the ethercat epoch (2000-01-01), in seconds
pub const ETHERCAT_EPOCH: u64 = 946_684_800;

/**
	the host realtime scheduler, as seen from a master

	times are in nanoseconds
*/
pub trait Scheduler: Send + Sync {
	/// monotonic time of the host
	fn now(&self) -> i64;
	/// wall clock time since the ethercat epoch
	fn wall_clock(&self) -> u64;
	/// true if [Self::set_pll_correction] has any effect
	fn pll_supported(&self) -> bool  {false}
	/// nominal start time of the current period of the realtime task
	fn pll_reference(&self) -> i64  {self.now()}
	/// shift applied to the next period of the realtime task
	fn set_pll_correction(&self, _correction: i32) {}
}

/// which clock the others follow
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockSource {
	/// the host clock, slave clocks trail
	Master,
	/// the reference slave clock, the host task trails
	Reference,
}

/// drift compensation when the reference clock is the time source
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DriftMode {
	/// compensate the task phase measured from the application time
	#[default]
	Simple,
	/// use a user-supplied drift value
	Manual,
}
impl DriftMode {
	pub fn from_raw(value: i32) -> Self {
		if value == 1  {Self::Manual}
		else           {Self::Simple}
	}
	pub fn raw(self) -> i32 {
		match self {Self::Simple => 0,  Self::Manual => 1}
	}
}

/// settings of the phase lock, the period-relative defaults are resolved when the master is created
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClockConfig {
	/// correction step, defaults to `period/1000`
	pub step: Option<u32>,
	/// error above which the reference is resynchronized, defaults to `period`
	pub max_error: Option<u32>,
	pub drift_mode: DriftMode,
	/// drift term in [DriftMode::Manual]
	pub drift: i32,
	/// debug offset always added to the correction
	pub offset: i32,
}
impl ClockConfig {
	/// tuning values with defaults resolved for the given period
	pub fn tuning(&self, period: u32) -> ClockTuning {
		ClockTuning {
			step: self.step.unwrap_or(period / 1000),
			max_error: self.max_error.unwrap_or(period),
			drift_mode: self.drift_mode,
			drift: self.drift,
			offset: self.offset,
		}
	}
}

/// values of the phase lock that can be changed at runtime
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClockTuning {
	pub step: u32,
	pub max_error: u32,
	pub drift_mode: DriftMode,
	pub drift: i32,
	pub offset: i32,
}

/// observable state of the phase lock, refreshed every cycle
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ClockStatus {
	/// last phase error
	pub error: i32,
	/// automatic correction output, before the debug offset
	pub output: i32,
	/// correction actually sent to the scheduler
	pub correction: i32,
	/// number of hard resynchronizations
	pub reset_count: u32,
	/// the phase is locked
	pub phased: bool,
	/// task phase relative to the activation time
	pub app_phase: u32,
	/// phase jitter measured by calibration
	pub jitter: u32,
	/// drift term of the last cycle
	pub drift: i32,
	/// consecutive cycles under the lock threshold
	pub lock_count: u32,
	/// calibration done
	pub calibrated: bool,
}

/**
	difference of two phases wrapped to `[-period/2, period/2]`

	a jump of more than half a period is taken as a wrap of the phase around the period
*/
pub fn wrap_phase(diff: i64, period: i64) -> i64 {
	if diff > period / 2        {diff - period}
	else if diff < -period / 2  {diff + period}
	else                        {diff}
}

/**
	bookkeeping of the application time of one master

	It is seeded at activation from the wall clock, then advanced every cycle
*/
#[derive(Copy, Clone, Debug)]
pub struct ApplicationClock {
	source: ClockSource,
	period: u32,
	/// wall clock offset added to the host time
	base: u64,
	/// accumulated reference, advanced by the cycle period each cycle when the reference clock is the time source
	dc_ref: u64,
	/// application time at activation, origin of the task phase
	dc_ref_time: u64,
}
impl ApplicationClock {
	pub fn new(source: ClockSource, period: u32) -> Self {
		Self {source, period, base: 0, dc_ref: 0, dc_ref_time: 0}
	}
	pub fn source(&self) -> ClockSource  {self.source}
	pub fn period(&self) -> u32  {self.period}
	pub fn activation_time(&self) -> u64  {self.dc_ref_time}

	/// seed the clock from the wall clock and host time at activation, returns the initial application time
	pub fn activate(&mut self, wall: u64, now: i64) -> u64 {
		self.base = wall;
		let initial = match self.source {
			ClockSource::Master => {
				self.base = self.base.wrapping_sub(now as u64);
				self.base.wrapping_add(now as u64)
			},
			ClockSource::Reference => self.base,
		};
		self.dc_ref_time = initial;
		self.dc_ref = 0;
		initial
	}
	/**
		application time of the current cycle, `reference` is the nominal start of the current period

		`period` is the length of the cycle as given by the host, it advances the accumulated reference
	*/
	pub fn tick(&mut self, now: i64, reference: i64, period: i64) -> u64 {
		match self.source {
			ClockSource::Master => self.base.wrapping_add(now as u64),
			ClockSource::Reference => {
				let time = self.base
					.wrapping_add(self.dc_ref)
					.wrapping_add(now.wrapping_sub(reference) as u64);
				self.dc_ref = self.dc_ref.wrapping_add(period as u64);
				time
			},
		}
	}
	/// task phase of the given application time
	pub fn phase(&self, app_time: u64) -> i64 {
		if self.period == 0  {return 0}
		(app_time.wrapping_sub(self.dc_ref_time) % self.period as u64) as i64
	}
	/// shift the accumulated reference to absorb the given error at once
	pub fn resync(&mut self, error: i64) {
		self.dc_ref = self.dc_ref.wrapping_sub(error as u64);
	}
}

/// jitter measurement of the task phase, run once after activation
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Calibration {
	Measuring {
		count: u32,
		min: i64,
		max: i64,
		/// last raw phase
		raw: i64,
		/// last phase, unwrapped from the first one
		unwrapped: i64,
	},
	Calibrated {
		jitter: i64,
		target: i64,
	},
}
impl Default for Calibration {
	fn default() -> Self {
		Self::Measuring {count: 0, min: 0, max: 0, raw: 0, unwrapped: 0}
	}
}
impl Calibration {
	/// take one phase sample, the calibration completes on the [PHASE_MEASURE_CYCLES]th sample
	pub fn sample(&mut self, phase: i64, period: i64) {
		let Self::Measuring {count, min, max, raw, unwrapped} = self
			else {return};
		if *count == 0 {
			(*min, *max, *raw, *unwrapped) = (phase, phase, phase, phase);
		}
		else {
			*unwrapped += wrap_phase(phase - *raw, period);
			*raw = phase;
			*min = (*min).min(*unwrapped);
			*max = (*max).max(*unwrapped);
		}
		*count += 1;
		if *count >= PHASE_MEASURE_CYCLES {
			let jitter = *max - *min;
			*self = Self::Calibrated {
				jitter,
				target: (jitter + jitter/2).min(period/8),
			};
		}
	}
	pub fn result(&self) -> Option<(i64, i64)> {
		match self {
			Self::Calibrated {jitter, target} => Some((*jitter, *target)),
			_ => None,
		}
	}
}

/// counter of consecutive cycles under the lock threshold
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LockCounter {
	count: u32,
	locked: bool,
}
impl LockCounter {
	/// account one cycle, returns whether the phase is locked
	pub fn update(&mut self, within: bool) -> bool {
		if within {
			self.count = self.count.saturating_add(1);
			if self.count >= LOCK_CYCLES
				{self.locked = true}
		}
		else {
			self.count = 0;
			self.locked = false;
		}
		self.locked
	}
	pub fn count(&self) -> u32  {self.count}
	pub fn locked(&self) -> bool  {self.locked}
}

/// inputs of one controller cycle
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClockSample {
	/// application time sent this cycle
	pub app_time: u64,
	/// reference clock time read back, if the read succeeded
	pub reference_time: Option<u32>,
}

/**
	phase lock strategy of a master

	[Self::update] is called once per cycle after the frame went out, and returns the correction to write to the scheduler, if any.
*/
pub trait PhaseLock: Send {
	fn update(&mut self, sample: ClockSample, clock: &mut ApplicationClock, tuning: &ClockTuning) -> Option<i32>;
	fn status(&self) -> &ClockStatus;
}

/// strategy doing nothing, when the scheduler cannot be corrected or no phase lock is configured
#[derive(Clone, Debug, Default)]
pub struct Free {
	status: ClockStatus,
}
impl PhaseLock for Free {
	fn update(&mut self, _: ClockSample, _: &mut ApplicationClock, _: &ClockTuning) -> Option<i32>  {None}
	fn status(&self) -> &ClockStatus  {&self.status}
}

/// bang-bang phase lock of the realtime task
#[derive(Clone, Debug, Default)]
pub struct Disciplined {
	calibration: Calibration,
	lock: LockCounter,
	/// lower 32 bits of the previous application time
	app_time_last: u32,
	/// the previous reference clock read succeeded and is trusted
	valid_last: bool,
	/// cycles elapsed since the drift term is settling
	drift_delay: u32,
	status: ClockStatus,
}
impl Disciplined {
	pub fn new() -> Self  {Self::default()}
	pub fn calibration(&self) -> &Calibration  {&self.calibration}

	/// master as time source: keep the task phase at the calibrated target
	fn follow_master(&mut self, phase: i64, period: i64, step: i64) -> (i64, i64, bool) {
		if let Calibration::Measuring {..} = self.calibration {
			self.calibration.sample(phase, period);
			if let Some((jitter, target)) = self.calibration.result()
				{log::info!("task phase calibrated, jitter {} ns, target {} ns", jitter, target)}
			return (0, 0, false);
		}
		let Some((jitter, target)) = self.calibration.result()
			else {return (0, 0, false)};
		let error = wrap_phase(phase - target, period);
		let threshold = jitter.max(period / 100);
		let was_locked = self.lock.locked();
		let phased = self.lock.update(error.abs() < threshold);
		if phased != was_locked
			{log::debug!("task phase {}", if phased {"locked"} else {"unlocked"})}
		let output =
			if phased         {0}
			else if error > 0 {-step}
			else if error < 0 {step}
			else              {0};
		(error, output, phased)
	}

	/// reference clock as time source: keep the application time trailing the reference clock
	fn follow_reference(&mut self, sample: ClockSample, phase: i64, clock: &mut ApplicationClock, tuning: &ClockTuning) -> (i64, i64, bool) {
		let period = clock.period() as i64;
		let step = tuning.step as i64;
		let mut valid = sample.reference_time.is_some();
		let mut result = (0, 0, false);
		self.status.drift = 0;

		if let (Some(reference), true) = (sample.reference_time, self.valid_last) {
			let raw_offset = self.app_time_last.wrapping_sub(reference) as i32 as i64;
			let drift = match tuning.drift_mode {
				DriftMode::Simple => {
					if self.drift_delay < DRIFT_SETTLE_CYCLES {
						self.drift_delay += 1;
						0
					}
					else {(period - phase).rem_euclid(period.max(1))}
				},
				DriftMode::Manual => tuning.drift as i64,
			};
			self.status.drift = drift as i32;
			let error = raw_offset + drift;
			let phased = error.abs() < period / 10;
			let mut output = 0;

			if error.abs() > tuning.max_error as i64 {
				clock.resync(error);
				valid = false;
				self.status.reset_count = self.status.reset_count.wrapping_add(1);
				if tuning.drift_mode == DriftMode::Simple
					{self.drift_delay = 0}
				log::info!("reference clock error {} ns over limit, resynchronizing", error);
			}
			else if ! phased {
				output = if error < 0 {-step} else {step};
			}
			result = (error, output, phased);
		}
		self.valid_last = valid;
		result
	}
}
impl PhaseLock for Disciplined {
	fn update(&mut self, sample: ClockSample, clock: &mut ApplicationClock, tuning: &ClockTuning) -> Option<i32> {
		let period = clock.period() as i64;
		let phase = clock.phase(sample.app_time);

		let (error, output, phased) = match clock.source() {
			ClockSource::Master => self.follow_master(phase, period, tuning.step as i64),
			ClockSource::Reference => self.follow_reference(sample, phase, clock, tuning),
		};
		let correction =
			if phased  {tuning.offset}
			else       {(output as i32).saturating_add(tuning.offset)};
		self.app_time_last = sample.app_time as u32;

		self.status.error = error.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
		self.status.output = output as i32;
		self.status.correction = correction;
		self.status.phased = phased;
		self.status.app_phase = phase as u32;
		self.status.lock_count = self.lock.count();
		if let Some((jitter, _)) = self.calibration.result() {
			self.status.jitter = jitter as u32;
			self.status.calibrated = true;
		}
		Some(correction)
	}
	fn status(&self) -> &ClockStatus  {&self.status}
}

/// pins exporting the phase lock state and tuning
#[derive(Clone, Debug)]
pub(crate) struct ClockPins {
	error: S32Pin,
	output: S32Pin,
	correction: S32Pin,
	reset_count: U32Pin,
	phased: BitPin,
	app_phase: U32Pin,
	jitter: U32Pin,
	drift: S32Pin,
	step: U32Pin,
	max_error: U32Pin,
	drift_mode: S32Pin,
	manual_drift: S32Pin,
	offset: S32Pin,
}
impl ClockPins {
	pub fn new(table: &mut PinTable, prefix: &str, tuning: &ClockTuning) -> EthercatResult<Self> {
		let pins = Self {
			error: table.new_s32(PinDir::Out, format!("{}.pll-err", prefix))?,
			output: table.new_s32(PinDir::Out, format!("{}.pll-out", prefix))?,
			correction: table.new_s32(PinDir::Out, format!("{}.pll-final", prefix))?,
			reset_count: table.new_u32(PinDir::Out, format!("{}.pll-reset-count", prefix))?,
			phased: table.new_bit(PinDir::Out, format!("{}.dc-phased", prefix))?,
			app_phase: table.new_u32(PinDir::Out, format!("{}.app-phase", prefix))?,
			jitter: table.new_u32(PinDir::Out, format!("{}.phase-jitter", prefix))?,
			drift: table.new_s32(PinDir::Out, format!("{}.pll-drift-calc", prefix))?,
			step: table.new_u32(PinDir::Io, format!("{}.pll-step", prefix))?,
			max_error: table.new_u32(PinDir::Io, format!("{}.pll-max-err", prefix))?,
			drift_mode: table.new_s32(PinDir::Io, format!("{}.drift-mode", prefix))?,
			manual_drift: table.new_s32(PinDir::Io, format!("{}.pll-drift", prefix))?,
			offset: table.new_s32(PinDir::Io, format!("{}.pll-offset", prefix))?,
		};
		pins.step.set(tuning.step);
		pins.max_error.set(tuning.max_error);
		pins.drift_mode.set(tuning.drift_mode.raw());
		pins.manual_drift.set(tuning.drift);
		pins.offset.set(tuning.offset);
		Ok(pins)
	}
	pub fn tuning(&self) -> ClockTuning {
		ClockTuning {
			step: self.step.get(),
			max_error: self.max_error.get(),
			drift_mode: DriftMode::from_raw(self.drift_mode.get()),
			drift: self.manual_drift.get(),
			offset: self.offset.get(),
		}
	}
	pub fn publish(&self, status: &ClockStatus) {
		self.error.set(status.error);
		self.output.set(status.output);
		self.correction.set(status.correction);
		self.reset_count.set(status.reset_count);
		self.phased.set(status.phased);
		self.app_phase.set(status.app_phase);
		self.jitter.set(status.jitter);
		self.drift.set(status.drift);
	}
}

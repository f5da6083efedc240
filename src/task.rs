/*!
	periodic realtime task driving masters

	This is a minimal host scheduler: one async loop per [Cyclic] implementor, waking on a timerfd deadline each period. The phase lock correction of a master is applied by shifting the next deadline, so the task period is stretched or shortened by the correction for one cycle.

	For realtime behavior, call [realtime] from the thread running the loop before starting it.
*/

use crate::{
	clock::{Scheduler, ETHERCAT_EPOCH},
	error::EthercatResult,
	master::Cyclic,
	};
use std::{
	sync::Arc,
	thread::JoinHandle,
	time::{Duration, Instant, SystemTime, UNIX_EPOCH},
	};
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering::Relaxed};
use futures_concurrency::future::Join;

/// host scheduler based on the monotonic clock of the process
#[derive(Debug)]
pub struct SystemScheduler {
	start: Instant,
	/// wall clock at `start`, since the ethercat epoch
	epoch: u64,
	period: u32,
	pll: bool,
	/// nominal start of the current period, relative to `start`
	reference: AtomicI64,
	correction: AtomicI32,
}

impl SystemScheduler {
	/// scheduler of a task with the given period in nanoseconds, `pll` enables phase lock corrections
	pub fn new(period: u32, pll: bool) -> Self {
		let unix = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_nanos() as u64;
		Self {
			start: Instant::now(),
			epoch: unix.saturating_sub(ETHERCAT_EPOCH * 1_000_000_000),
			period,
			pll,
			reference: AtomicI64::new(0),
			correction: AtomicI32::new(0),
		}
	}
	pub fn period(&self) -> u32  {self.period}
	/// last correction requested
	pub fn correction(&self) -> i32  {self.correction.load(Relaxed)}

	fn elapsed(&self, at: Instant) -> i64 {
		at.saturating_duration_since(self.start).as_nanos() as i64
	}
	/// mark the nominal start of a new period
	fn begin_period(&self, deadline: Instant) {
		self.reference.store(self.elapsed(deadline), Relaxed);
	}
	/// deadline of the next period, shifted by the current correction
	fn next_deadline(&self, deadline: Instant) -> Instant {
		let correction = if self.pll {self.correction()} else {0};
		let next = deadline + Duration::from_nanos(self.period as u64);
		if correction >= 0  {next + Duration::from_nanos(correction as u64)}
		else                {next - Duration::from_nanos(correction.unsigned_abs() as u64)}
	}
}

impl Scheduler for SystemScheduler {
	fn now(&self) -> i64  {self.elapsed(Instant::now())}
	fn wall_clock(&self) -> u64  {self.epoch.wrapping_add(self.now() as u64)}
	fn pll_supported(&self) -> bool  {self.pll}
	fn pll_reference(&self) -> i64  {self.reference.load(Relaxed)}
	fn set_pll_correction(&self, correction: i32) {
		self.correction.store(correction, Relaxed);
	}
}

/**
	run `cyclic` every period of `scheduler` until `stop` is set

	each period calls read then write. A read error is only logged, a write error stops the task and is returned, as it means a master failed.
*/
pub async fn run<C: Cyclic + ?Sized>(cyclic: &mut C, scheduler: &SystemScheduler, stop: &AtomicBool) -> EthercatResult {
	let period = scheduler.period() as i64;
	let mut deadline = Instant::now();
	while ! stop.load(Relaxed) {
		scheduler.begin_period(deadline);
		if let Err(e) = cyclic.read(period) {
			log::error!("cyclic read failed: {}", e);
		}
		cyclic.write(period)?;
		deadline = scheduler.next_deadline(deadline);
		tokio_timerfd::Delay::new(deadline)?.await?;
	}
	Ok(())
}

/// run several tasks concurrently, each with its own scheduler, until `stop` is set
pub async fn run_all<C: Cyclic>(tasks: Vec<(&mut C, &SystemScheduler)>, stop: &AtomicBool) -> Vec<EthercatResult> {
	tasks.into_iter()
		.map(|(cyclic, scheduler)| run(cyclic, scheduler, stop))
		.collect::<Vec<_>>()
		.join()
		.await
}

/**
	run `cyclic` in a dedicated thread with realtime priorities and its own single-threaded runtime

	the thread ends when `stop` is set or a write fails, and returns the result of [run]
*/
pub fn spawn<C>(mut cyclic: C, scheduler: Arc<SystemScheduler>, stop: Arc<AtomicBool>) -> JoinHandle<EthercatResult>
where C: Cyclic + Send + 'static
{
	std::thread::spawn(move || {
		realtime();
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()?;
		runtime.block_on(run(&mut cyclic, &scheduler, &stop))
	})
}

/**
	switch the current thread to fifo realtime scheduling at maximal priority, raise the io priority and lock the process memory

	failures are logged, the task then runs with normal priorities
*/
pub fn realtime() {
	#[cfg(target_os = "linux")]
	{
		use thread_priority::{
			set_thread_priority_and_policy, thread_native_id,
			ThreadPriority, ThreadSchedulePolicy, RealtimeThreadSchedulePolicy,
			};
		use ioprio::{set_priority, Target, Pid, Priority, Class, RtPriorityLevel};

		if let Err(e) = set_thread_priority_and_policy(
				thread_native_id(),
				ThreadPriority::Max,
				ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
				) {
			log::warn!("cannot switch thread to realtime fifo scheduling: {:?}", e);
		}
		if let Err(e) = set_priority(
				Target::Process(Pid::this()),
				Priority::new(Class::Realtime(RtPriorityLevel::highest())),
				) {
			log::warn!("cannot set realtime io priority: {:?}", e);
		}
		// SAFETY: mlockall has no memory safety requirement
		if unsafe {libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE)} != 0 {
			log::warn!("cannot lock memory: {}", std::io::Error::last_os_error());
		}
	}
	#[cfg(not(target_os = "linux"))]
	log::warn!("realtime priorities are only supported on linux");
}

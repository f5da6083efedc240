#![cfg(target_os = "linux")]

use thread_priority::{
	set_thread_priority_and_policy, thread_native_id,
	ThreadPriority, ThreadSchedulePolicy, RealtimeThreadSchedulePolicy,
	};

fn init_logs() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn policy() -> i32 {
	// SAFETY: sched_getscheduler only reads the scheduling policy of the calling thread
	unsafe {libc::sched_getscheduler(0)}
}

#[test]
fn realtime_switches_to_fifo() {
	init_logs();
	let (before, after, allowed) = std::thread::spawn(|| {
		let before = policy();
		ethercycle::task::realtime();
		let after = policy();
		// whether this process may use realtime scheduling at all
		let allowed = after == libc::SCHED_FIFO || set_thread_priority_and_policy(
			thread_native_id(),
			ThreadPriority::Max,
			ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
			).is_ok();
		(before, after, allowed)
	}).join().unwrap();

	assert_eq!(before, libc::SCHED_OTHER);
	if allowed {
		assert_eq!(after, libc::SCHED_FIFO);
	}
	else {
		// without the permission the task keeps running with normal priorities
		assert_eq!(after, libc::SCHED_OTHER);
	}
}

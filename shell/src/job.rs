use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::{self,Signal};
use nix::sys::wait::{self,WaitPidFlag,WaitStatus};
use nix::unistd::Pid;
use tracing::{debug,warn};

pub type JobId = u32;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State { Active, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) => State::Terminated,
			WaitStatus::Signaled(..) => State::Terminated,
			_ => State::Active,
		}
	}
}

/// Non-blocking liveness check. A pid the kernel no longer knows as our child
/// has already been reaped and counts as terminated.
fn poll_pid(pid: Pid) -> State {
	match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
		Ok(status) => {
			let state = status.state();
			if state == State::Terminated {
				debug!(%pid, ?status, "reaped background process");
			}
			state
		},
		Err(Errno::ECHILD) => State::Terminated,
		Err(e) => {
			warn!(%pid, error = %e, "waitpid failed");
			State::Active
		},
	}
}

/// Blocks until `pid` has terminated and been reaped.
pub fn wait_pid(pid: Pid) {
	loop {
		match wait::waitpid(pid, None) {
			Ok(status) => if status.state() == State::Terminated {
				debug!(%pid, ?status, "reaped foreground process");
				return;
			},
			Err(Errno::EINTR) => {},
			Err(e) => {
				if e != Errno::ECHILD {
					warn!(%pid, error = %e, "waitpid failed");
				}
				return;
			},
		}
	}
}

/// A background job. Foreground jobs never become one of these; they are waited
/// on straight out of the `JobBuilder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	pub id: JobId,
	pub command: String,
	leader: Pid,
	pids: Vec<Pid>,
}

impl Job {
	/// The first process of the pipeline, even after it has been reaped.
	pub fn leader(&self) -> Pid {
		self.leader
	}

	/// Processes not yet seen to exit, in pipeline order.
	pub fn pids(&self) -> &[Pid] {
		&self.pids
	}

	pub fn entry(&self) -> JobEntry {
		JobEntry { id: self.id, pid: self.leader, command: &self.command }
	}
}

/// One line of the job listing: `[<job_id>]\t<pid>\t<command_text>`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct JobEntry<'a> {
	pub id: JobId,
	pub pid: Pid,
	pub command: &'a str,
}

impl<'a> fmt::Display for JobEntry<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}]\t{}\t{}", self.id, self.pid, self.command)
	}
}

/// Collects the processes of a pipeline while it is being launched.
#[derive(Debug)]
pub struct JobBuilder {
	command: String,
	pids: Vec<Pid>,
}

impl JobBuilder {
	pub fn new(command: &str, size_hint: usize) -> JobBuilder {
		JobBuilder { command: command.to_string(), pids: Vec::with_capacity(size_hint) }
	}

	pub fn push(&mut self, pid: Pid) {
		self.pids.push(pid);
	}

	pub fn pids(&self) -> &[Pid] {
		&self.pids
	}

	pub fn is_empty(&self) -> bool {
		self.pids.is_empty()
	}

	pub fn last_pid(&self) -> Option<Pid> {
		self.pids.last().cloned()
	}

	/// Blocks until every process of the job has exited, consuming it.
	pub fn wait(self) -> Vec<Pid> {
		for &pid in &self.pids {
			wait_pid(pid);
		}
		self.pids
	}

	fn build(self, id: JobId) -> Job {
		assert!(!self.pids.is_empty());
		Job { id: id, command: self.command, leader: self.pids[0], pids: self.pids }
	}
}

/// Background jobs in the order they were started. Owns the job id counter, so
/// an id is never handed out twice during the shell's lifetime.
#[derive(Debug)]
pub struct JobTable {
	jobs: Vec<Job>,
	next_id: JobId,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable { jobs: vec![], next_id: 1 }
	}

	/// Assigns the next job id and takes ownership of the job.
	pub fn insert(&mut self, builder: JobBuilder) -> &Job {
		let id = self.next_id;
		self.next_id += 1;
		self.jobs.push(builder.build(id));
		&self.jobs[self.jobs.len() - 1]
	}

	pub fn get(&self, id: JobId) -> Option<&Job> {
		self.jobs.iter().find(|job| job.id == id)
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	pub fn list(&self) -> impl Iterator<Item = JobEntry<'_>> + Clone + '_ {
		self.jobs.iter().map(Job::entry)
	}

	/// Fire-and-forget: processes that already exited are skipped silently and an
	/// unknown id does nothing.
	pub fn signal(&self, id: JobId, sig: Signal) {
		let job = match self.get(id) {
			Some(job) => job,
			None => {
				debug!(job_id = id, "no such job");
				return;
			},
		};
		for &pid in &job.pids {
			match signal::kill(pid, sig) {
				Ok(()) => debug!(job_id = id, %pid, ?sig, "sent signal"),
				Err(Errno::ESRCH) => {},
				Err(e) => warn!(job_id = id, %pid, error = %e, "kill failed"),
			}
		}
	}

	/// Drops exited processes from every job and hands back the jobs that have no
	/// processes left, in table order. Never blocks.
	pub fn poll_once(&mut self) -> Vec<Job> {
		for job in &mut self.jobs {
			job.pids.retain(|&pid| poll_pid(pid) == State::Active);
		}
		let (done, alive): (Vec<Job>, Vec<Job>) = self.jobs.drain(..).partition(|job| job.pids.is_empty());
		self.jobs = alive;
		done
	}
}

use std::fs::OpenOptions;
use std::io::{self,Write};
use std::os::fd::{AsRawFd,OwnedFd};

use nix::fcntl::OFlag;
use nix::sys::signal::{self,SaFlags,SigAction,SigHandler,SigSet,Signal};
use nix::unistd::{self,ForkResult,Pid};
use tracing::debug;

use crate::builtin;
use crate::error::{self,ExecError};
use crate::job::{JobBuilder,JobId,JobTable};
use crate::types::{CommandDescriptor,Pipeline};

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, PartialEq, Eq)]
pub enum EvalResult {
	/// The shell should leave its main loop. No job was created.
	Exit,
	/// Foreground pipeline; every listed process has been waited on.
	Done(Vec<Pid>),
	/// Background pipeline now owned by the job table. `pid` is the last stage.
	Background { id: JobId, pid: Pid },
}

fn open_redirect(path: &str, options: &OpenOptions) -> Result<OwnedFd, ExecError> {
	options.open(path)
		.map(OwnedFd::from)
		.map_err(|e| ExecError::RedirectOpen { path: path.to_string(), source: e })
}

fn dup_onto(fd: Option<OwnedFd>, target: libc::c_int) -> Result<(), ExecError> {
	if let Some(fd) = fd {
		unistd::dup2(fd.as_raw_fd(), target)?;
	}
	Ok(())
}

/// Everything a stage does between `fork` and `_exit`. Every descriptor handed in
/// is owned here and closed on return, including the early error returns.
fn do_exec_stage(descriptor: &CommandDescriptor, pipe_in: Option<OwnedFd>, pipe_out: Option<OwnedFd>,
                 jobs: &JobTable) -> Result<i32, ExecError> {
	let flags = descriptor.flags;

	// A missing upstream pipe falls back to the redirect, then to /dev/null.
	let stdin = match (flags.pipe_in, pipe_in) {
		(true, Some(fd)) => Some(fd),
		_ if flags.redirect_in => {
			let path = descriptor.redirect_in.as_deref().unwrap_or("");
			Some(open_redirect(path, OpenOptions::new().read(true))?)
		},
		(true, None) => Some(open_redirect(DEV_NULL, OpenOptions::new().read(true))?),
		(false, _) => None,
	};

	let stdout = match (flags.pipe_out, pipe_out) {
		(_, Some(fd)) => Some(fd),
		(false, None) if flags.redirect_out => {
			let path = descriptor.redirect_out.as_deref().unwrap_or("");
			let mut options = OpenOptions::new();
			options.write(true).create(true);
			if flags.append {
				options.append(true);
			} else {
				options.truncate(true);
			}
			Some(open_redirect(path, &options)?)
		},
		_ => None,
	};

	dup_onto(stdin, libc::STDIN_FILENO)?;
	dup_onto(stdout, libc::STDOUT_FILENO)?;
	reset_signals()?;
	builtin::child_run(&descriptor.command, jobs)
}

/// The Rust runtime ignores SIGPIPE in the shell, and an ignored signal survives
/// `execvp`. Stages must die when their reader goes away.
fn reset_signals() -> Result<(), ExecError> {
	let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	unsafe { signal::sigaction(Signal::SIGPIPE, &default) }?;
	Ok(())
}

fn exec_stage(descriptor: &CommandDescriptor, pipe_in: Option<OwnedFd>, pipe_out: Option<OwnedFd>,
              jobs: &JobTable) -> ! {
	let status = do_exec_stage(descriptor, pipe_in, pipe_out, jobs).unwrap_or_else(|e| {
		error::report_in_stage(&e);
		e.exit_status()
	});
	unsafe { libc::_exit(status) }
}

/// Owns the pipe between the stage just launched and the next one. Dropping it
/// closes whatever end is still held, so no pipe outlives one `run` call.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
	upstream: Option<OwnedFd>,
}

impl PipelineBuilder {
	pub fn new() -> PipelineBuilder {
		PipelineBuilder { upstream: None }
	}

	/// Forks one stage with its standard streams wired up and returns its pid.
	pub fn launch(&mut self, descriptor: &CommandDescriptor, position: usize, jobs: &JobTable) -> Result<Pid, ExecError> {
		// Taken even when unused so a read end nobody asked for is closed now.
		let pipe_in = self.upstream.take();
		let (downstream, pipe_out) = if descriptor.flags.pipe_out {
			let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
			debug!(position, read = read.as_raw_fd(), write = write.as_raw_fd(), "created pipe");
			(Some(read), Some(write))
		} else {
			(None, None)
		};

		// The child would flush a copy of anything still buffered.
		let _ = io::stdout().flush();
		match unsafe { unistd::fork() }.map_err(ExecError::Spawn)? {
			ForkResult::Parent { child } => {
				debug!(position, pid = %child, "forked stage");
				drop(pipe_in);
				drop(pipe_out);
				self.upstream = downstream;
				Ok(child)
			},
			ForkResult::Child => {
				drop(downstream);
				exec_stage(descriptor, pipe_in, pipe_out, jobs)
			},
		}
	}

	/// Launches every stage in order. A stage that fails to launch is reported and
	/// skipped; the rest of the pipeline still runs.
	pub fn run(mut self, jobs: &mut JobTable, pipeline: &Pipeline) -> JobBuilder {
		let mut job_builder = JobBuilder::new(&pipeline.text, pipeline.stages.len());
		for (i, descriptor) in pipeline.stages.iter().enumerate() {
			match self.launch(descriptor, i, jobs) {
				Ok(pid) => {
					job_builder.push(pid);
					if let Err(e) = builtin::shell_run(&descriptor.command, jobs) {
						error::report(&e);
					}
				},
				Err(e) => error::report(&e),
			}
		}
		job_builder
	}
}

/// Launches `pipeline`, then either waits for it or hands it to `jobs`.
pub fn eval(jobs: &mut JobTable, pipeline: &Pipeline) -> EvalResult {
	if pipeline.is_exit() {
		return EvalResult::Exit;
	}

	let job_builder = PipelineBuilder::new().run(jobs, pipeline);
	if !pipeline.is_background() {
		return EvalResult::Done(job_builder.wait());
	}
	match job_builder.last_pid() {
		Some(pid) => {
			let id = jobs.insert(job_builder).id;
			EvalResult::Background { id: id, pid: pid }
		},
		None => EvalResult::Done(vec![]),
	}
}

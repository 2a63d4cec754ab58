use std::env;
use std::ffi::CString;
use std::io::{self,Write};

use nix::sys::signal::Signal;
use nix::unistd;
use tracing::debug;

use crate::error::{ExecError,StageStream};
use crate::job::JobTable;
use crate::types::Command;

pub fn lookup_environment(name: &str) -> Option<String> {
	env::var_os(name).and_then(|v| v.into_string().ok())
}

fn builtin_exec(args: &[String]) -> Result<i32, ExecError> {
	let program = match args.first() {
		Some(p) => p,
		None => return Ok(0),
	};
	let argv: Result<Vec<CString>, _> = args.iter().map(|s| CString::new(s.as_bytes())).collect();
	let argv = argv?;
	let e = match unistd::execvp(&argv[0], &argv) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	Err(ExecError::Exec { program: program.clone(), source: e })
}

fn builtin_echo(args: &[String]) -> Result<i32, ExecError> {
	let mut out = StageStream(io::stdout());
	writeln!(out, "{}", args.join(" "))?;
	out.flush()?;
	Ok(0)
}

fn builtin_pwd() -> Result<i32, ExecError> {
	let cwd = unistd::getcwd()?;
	let mut out = StageStream(io::stdout());
	writeln!(out, "{}", cwd.display())?;
	out.flush()?;
	Ok(0)
}

fn builtin_jobs(jobs: &JobTable) -> Result<i32, ExecError> {
	let mut out = StageStream(io::stdout());
	for entry in jobs.list() {
		writeln!(out, "{}", entry)?;
	}
	out.flush()?;
	Ok(0)
}

fn builtin_export(name: &str, value: &str) -> Result<(), ExecError> {
	env::set_var(name, value);
	Ok(())
}

/// Moves the shell to `path`, recording where it came from in `OLD_PWD`.
fn builtin_cd(path: Option<&str>) -> Result<(), ExecError> {
	let path = path.ok_or(ExecError::NoDirectory)?;
	let old = unistd::getcwd().map(|p| p.into_os_string()).ok().or_else(|| env::var_os("PWD"));
	unistd::chdir(path).map_err(|e| ExecError::ChangeDirectory { path: path.to_string(), source: e })?;
	let new = unistd::getcwd()?;
	if let Some(old) = old {
		env::set_var("OLD_PWD", old);
	}
	env::set_var("PWD", new);
	Ok(())
}

fn builtin_kill(jobs: &JobTable, job_id: u32, signal: i32) -> Result<(), ExecError> {
	let sig = Signal::try_from(signal).map_err(|_| ExecError::InvalidSignal(signal))?;
	jobs.signal(job_id, sig);
	Ok(())
}

/// Runs `command` inside a freshly forked stage. Returns the status the stage
/// should exit with; external programs only come back on failure.
pub fn child_run(command: &Command, jobs: &JobTable) -> Result<i32, ExecError> {
	match *command {
		Command::External { ref args } => builtin_exec(args),
		Command::Echo { ref args } => builtin_echo(args),
		Command::PrintWorkingDirectory => builtin_pwd(),
		Command::ListJobs => builtin_jobs(jobs),
		Command::Export { .. } |
		Command::ChangeDirectory { .. } |
		Command::SendSignal { .. } |
		Command::Exit |
		Command::EndOfCommands => Ok(0),
	}
}

/// Runs the part of `command` that has to change the shell itself.
pub fn shell_run(command: &Command, jobs: &mut JobTable) -> Result<(), ExecError> {
	debug!(?command, "shell side of stage");
	match *command {
		Command::Export { ref name, ref value } => builtin_export(name, value),
		Command::ChangeDirectory { ref path } => builtin_cd(path.as_deref()),
		Command::SendSignal { job_id, signal } => builtin_kill(jobs, job_id, signal),
		Command::External { .. } |
		Command::Echo { .. } |
		Command::PrintWorkingDirectory |
		Command::ListJobs |
		Command::Exit |
		Command::EndOfCommands => Ok(()),
	}
}

use std::{ffi,io};
use std::io::Write;
use std::os::fd::AsFd;

use nix::unistd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("cannot fork: {0}")]
	Spawn(#[source] nix::Error),
	#[error("{program}: {source}")]
	Exec { program: String, #[source] source: nix::Error },
	#[error("{path}: {source}")]
	RedirectOpen { path: String, #[source] source: io::Error },
	#[error("cd: no directory given")]
	NoDirectory,
	#[error("cd: {path}: {source}")]
	ChangeDirectory { path: String, #[source] source: nix::Error },
	#[error("kill: invalid signal {0}")]
	InvalidSignal(i32),
	#[error("Nix error: {0}")]
	Nix(#[from] nix::Error),
	#[error("IO error: {0}")]
	Io(#[from] io::Error),
	#[error("Nul char error: {0}")]
	Nul(#[from] ffi::NulError),
}

impl ExecError {
	/// Exit status of a child process that failed before or while exec'ing.
	pub fn exit_status(&self) -> i32 {
		match *self {
			ExecError::Exec { source: nix::Error::ENOENT, .. } => 127,
			_ => 126,
		}
	}
}

/// Unlocked writer over a standard stream, for use between `fork` and `_exit`:
/// the `io::stdout()`/`io::stderr()` locks may have been held by another thread
/// of the parent at fork time.
pub struct StageStream<F: AsFd>(pub F);

impl<F: AsFd> Write for StageStream<F> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		unistd::write(&self.0, buf).map_err(io::Error::from)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn report_to<W: Write>(out: &mut W, e: &dyn std::error::Error) {
	let _ = out.write_all(format!("pish: {}\n", e).as_bytes());
}

pub fn report(e: &dyn std::error::Error) {
	report_to(&mut io::stderr(), e);
}

/// `report` for a forked stage.
pub fn report_in_stage(e: &dyn std::error::Error) {
	report_to(&mut StageStream(io::stderr()), e);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_program_exits_127() {
		let e = ExecError::Exec { program: "nope".to_string(), source: nix::Error::ENOENT };
		assert_eq!(e.exit_status(), 127);
		assert_eq!(e.to_string(), "nope: ENOENT: No such file or directory");
	}

	#[test]
	fn stage_reports_go_straight_to_the_descriptor() {
		use std::fs::File;
		use std::io::Read;

		let (read, write) = unistd::pipe().unwrap();
		let e = ExecError::RedirectOpen {
			path: "missing.txt".to_string(),
			source: io::Error::from(io::ErrorKind::NotFound),
		};
		report_to(&mut StageStream(&write), &e);
		drop(write);

		let mut text = String::new();
		File::from(read).read_to_string(&mut text).unwrap();
		assert!(text.starts_with("pish: missing.txt: "));
		assert!(text.ends_with('\n'));
		assert_eq!(text.lines().count(), 1);
	}

	#[test]
	fn other_failures_exit_126() {
		let e = ExecError::Exec { program: "x".to_string(), source: nix::Error::EACCES };
		assert_eq!(e.exit_status(), 126);
		assert_eq!(ExecError::NoDirectory.exit_status(), 126);
	}
}

use std::io::{self,Write};

use nix::sys::signal::Signal;

use crate::eval::{self,EvalResult};
use crate::job::{JobEntry,JobId,JobTable};
use crate::types::Pipeline;

/// The shell's own state: its background jobs and where job-control messages go.
pub struct Shell<W: Write> {
	jobs: JobTable,
	out: W,
}

impl Shell<io::Stdout> {
	pub fn new() -> Shell<io::Stdout> {
		Shell::with_output(io::stdout())
	}
}

impl<W: Write> Shell<W> {
	pub fn with_output(out: W) -> Shell<W> {
		Shell { jobs: JobTable::new(), out: out }
	}

	pub fn jobs(&self) -> &JobTable {
		&self.jobs
	}

	pub fn output(&self) -> &W {
		&self.out
	}

	/// One iteration of the shell: report finished background jobs, then run
	/// `pipeline` in the foreground or background.
	pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> EvalResult {
		self.poll_background_jobs();
		let _ = self.out.flush();
		let r = eval::eval(&mut self.jobs, pipeline);
		if let EvalResult::Background { id, pid } = r {
			let entry = JobEntry { id: id, pid: pid, command: &pipeline.text };
			let _ = writeln!(self.out, "Background job started: {}", entry);
			let _ = self.out.flush();
		}
		r
	}

	/// Retires every background job whose processes have all exited, printing a
	/// completion line for each. Returns the retired ids.
	pub fn poll_background_jobs(&mut self) -> Vec<JobId> {
		let done = self.jobs.poll_once();
		for job in &done {
			let _ = writeln!(self.out, "Completed: \t{}", job.entry());
		}
		let _ = self.out.flush();
		done.iter().map(|job| job.id).collect()
	}

	pub fn list_jobs(&self) -> impl Iterator<Item = JobEntry<'_>> + Clone + '_ {
		self.jobs.list()
	}

	pub fn signal_job(&self, id: JobId, sig: Signal) {
		self.jobs.signal(id, sig)
	}
}

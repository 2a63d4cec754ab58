/// One parsed command. Immutable once the parser hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// `args[0]` is the program, looked up through `PATH`.
	External { args: Vec<String> },
	Echo { args: Vec<String> },
	Export { name: String, value: String },
	ChangeDirectory { path: Option<String> },
	SendSignal { job_id: u32, signal: i32 },
	PrintWorkingDirectory,
	ListJobs,
	Exit,
	EndOfCommands,
}

/// How a stage's standard streams are wired. Kept apart from `Command` so the
/// launcher never needs to look at what the command actually is.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
	pub pipe_in: bool,
	pub pipe_out: bool,
	pub redirect_in: bool,
	pub redirect_out: bool,
	/// Only meaningful together with `redirect_out`.
	pub append: bool,
	/// Only read from the first stage of a pipeline.
	pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
	pub command: Command,
	pub flags: Flags,
	pub redirect_in: Option<String>,
	pub redirect_out: Option<String>,
}

impl CommandDescriptor {
	pub fn new(command: Command) -> CommandDescriptor {
		CommandDescriptor { command: command, flags: Flags::default(), redirect_in: None, redirect_out: None }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
	pub stages: Vec<CommandDescriptor>,
	pub text: String,
}

impl Pipeline {
	/// Stages after an `EndOfCommands` marker are dropped along with the marker.
	pub fn new(stages: Vec<CommandDescriptor>, text: String) -> Pipeline {
		let stages = stages.into_iter()
			.take_while(|d| d.command != Command::EndOfCommands)
			.collect();
		Pipeline { stages: stages, text: text }
	}

	pub fn is_background(&self) -> bool {
		self.stages.first().map_or(false, |d| d.flags.background)
	}

	pub fn is_exit(&self) -> bool {
		self.stages.len() == 1 && self.stages[0].command == Command::Exit
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn end_of_commands_terminates_the_pipeline() {
		let stages = vec![
			CommandDescriptor::new(Command::PrintWorkingDirectory),
			CommandDescriptor::new(Command::EndOfCommands),
			CommandDescriptor::new(Command::ListJobs),
		];
		let pipeline = Pipeline::new(stages, "pwd".to_string());
		assert_eq!(pipeline.stages.len(), 1);
		assert!(!pipeline.is_exit());
	}

	#[test]
	fn exit_only_when_alone() {
		let alone = Pipeline::new(vec![CommandDescriptor::new(Command::Exit)], "exit".to_string());
		assert!(alone.is_exit());

		let piped = Pipeline::new(vec![
			CommandDescriptor::new(Command::Exit),
			CommandDescriptor::new(Command::PrintWorkingDirectory),
		], "exit | pwd".to_string());
		assert!(!piped.is_exit());
	}

	#[test]
	fn background_is_read_from_first_stage() {
		let mut first = CommandDescriptor::new(Command::ListJobs);
		let mut second = CommandDescriptor::new(Command::ListJobs);
		second.flags.background = true;
		let pipeline = Pipeline::new(vec![first.clone(), second.clone()], "jobs | jobs".to_string());
		assert!(!pipeline.is_background());

		first.flags.background = true;
		second.flags.background = false;
		let pipeline = Pipeline::new(vec![first, second], "jobs | jobs &".to_string());
		assert!(pipeline.is_background());
	}
}

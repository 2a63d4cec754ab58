use std::str::FromStr;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::builtin::lookup_environment;
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("empty redirect")]
	EmptyRedirect,
	#[error("character after '&': '{0}'")]
	AfterBackground(char),
	#[error("{0}: missing argument")]
	MissingArgument(&'static str),
	#[error("{0}: invalid argument '{1}'")]
	InvalidArgument(&'static str, String),
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum RedirectType { Input, Output, Append }

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		match c {
			b' ' | b'\t' | b'\n' | b'\r' => true,
			_ => false,
		}
	}

	fn is_letter(c: u8) -> bool {
		match c {
			b'>' | b'<' | b'&' | b'|' => false,
			_ => !Parser::is_whitespace(c),
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(Parser::is_letter);
		&self.line[orig .. self.i]
	}

	/// `$NAME` becomes the variable's value; an unset variable yields no word.
	fn expand(word: &[u8]) -> Option<String> {
		let word = String::from_utf8_lossy(word);
		match word.strip_prefix('$') {
			Some(name) if !name.is_empty() => lookup_environment(name),
			_ => Some(word.into_owned()),
		}
	}

	fn parse_redirect(&mut self) -> ParseResult<Option<(RedirectType, String)>> {
		let typ = match self.line.get(self.i) {
			Some(&b'<') => {
				self.i += 1;
				RedirectType::Input
			},
			Some(&b'>') => if self.line.get(self.i+1) == Some(&b'>') {
				self.i += 2;
				RedirectType::Append
			} else {
				self.i += 1;
				RedirectType::Output
			},
			_ => return Ok(None),
		};

		self.skip_whitespaces();
		let target = self.read_word();
		if target.is_empty() {
			return Err(ParseError::EmptyRedirect);
		}
		Ok(Some((typ, String::from_utf8_lossy(target).into_owned())))
	}

	fn parse_and_apply_redirects(&mut self, descriptor: &mut CommandDescriptor) -> ParseResult<()> {
		while let Some((typ, target)) = self.parse_redirect()? {
			match typ {
				RedirectType::Input => {
					descriptor.flags.redirect_in = true;
					descriptor.redirect_in = Some(target);
				},
				RedirectType::Output | RedirectType::Append => {
					descriptor.flags.redirect_out = true;
					descriptor.flags.append = typ == RedirectType::Append;
					descriptor.redirect_out = Some(target);
				},
			}
			self.skip_whitespaces();
		}
		Ok(())
	}

	fn parse_command(&mut self) -> ParseResult<CommandDescriptor> {
		let mut descriptor = CommandDescriptor::new(Command::EndOfCommands);
		let mut words: Vec<String> = vec![];

		self.parse_and_apply_redirects(&mut descriptor)?;
		loop {
			self.skip_whitespaces();
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			words.extend(Parser::expand(word));
			self.skip_whitespaces();
			self.parse_and_apply_redirects(&mut descriptor)?;
		}

		descriptor.command = build_command(words)?;
		Ok(descriptor)
	}

	fn parse_pipeline(&mut self) -> ParseResult<Vec<CommandDescriptor>> {
		let mut stages: Vec<CommandDescriptor> = vec![];
		let mut is_background = false;

		loop {
			self.skip_whitespaces();
			stages.push(self.parse_command()?);
			match self.line.get(self.i) {
				Some(&b'|') => { self.i += 1; },
				Some(&b'&') => {
					self.i += 1;
					is_background = true;
					self.skip_whitespaces();
					if let Some(&c) = self.line.get(self.i) {
						return Err(ParseError::AfterBackground(c as char));
					} else {
						break;
					}
				},
				Some(_) => unreachable!("a command stops only at '|', '&' or end of line"),
				None => { break; },
			}
		}

		let last = stages.len() - 1;
		for (i, stage) in stages.iter_mut().enumerate() {
			stage.flags.pipe_in = i != 0;
			stage.flags.pipe_out = i != last;
		}
		stages[0].flags.background = is_background;
		Ok(stages)
	}
}

fn parse_signal(arg: &str) -> Option<i32> {
	let arg = arg.trim_start_matches('-');
	if let Ok(n) = arg.parse::<i32>() {
		return Some(n);
	}
	let name = arg.to_ascii_uppercase();
	let name = if name.starts_with("SIG") { name } else { format!("SIG{}", name) };
	Signal::from_str(&name).ok().map(|s| s as i32)
}

fn build_command(mut words: Vec<String>) -> ParseResult<Command> {
	if words.is_empty() {
		return Err(ParseError::EmptyCommand);
	}
	let name = words[0].clone();
	let command = match name.as_str() {
		"echo" => Command::Echo { args: words.split_off(1) },
		"export" => {
			let arg = words.get(1).ok_or(ParseError::MissingArgument("export"))?;
			match arg.split_once('=') {
				Some((name, value)) if !name.is_empty() => Command::Export { name: name.to_string(), value: value.to_string() },
				_ => return Err(ParseError::InvalidArgument("export", arg.clone())),
			}
		},
		"cd" => Command::ChangeDirectory { path: words.get(1).cloned() },
		"kill" => {
			let sig = words.get(1).ok_or(ParseError::MissingArgument("kill"))?;
			let job = words.get(2).ok_or(ParseError::MissingArgument("kill"))?;
			let signal = parse_signal(sig).ok_or_else(|| ParseError::InvalidArgument("kill", sig.clone()))?;
			let job_id = job.trim_start_matches('%').parse::<u32>()
				.map_err(|_| ParseError::InvalidArgument("kill", job.clone()))?;
			Command::SendSignal { job_id: job_id, signal: signal }
		},
		"pwd" => Command::PrintWorkingDirectory,
		"jobs" => Command::ListJobs,
		"exit" | "quit" => Command::Exit,
		_ => Command::External { args: words },
	};
	Ok(command)
}

/// Parses one input line. A blank line is not an error; it just has no pipeline.
pub fn parse(line: &[u8]) -> ParseResult<Option<Pipeline>> {
	let text = String::from_utf8_lossy(line).trim().to_string();
	if text.is_empty() {
		return Ok(None);
	}
	let mut parser = Parser { line: line, i: 0 };
	let stages = parser.parse_pipeline()?;
	Ok(Some(Pipeline::new(stages, text)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::env;
	use crate::test::PROCESS_LOCK;

	fn parse_one(line: &str) -> Pipeline {
		parse(line.as_bytes()).unwrap().unwrap()
	}

	fn words(ws: &[&str]) -> Vec<String> {
		ws.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn blank_line() {
		assert_eq!(parse(b"  \t\n"), Ok(None));
	}

	#[test]
	fn external_program() {
		let p = parse_one("ls -l /tmp\n");
		assert_eq!(p.text, "ls -l /tmp");
		assert_eq!(p.stages.len(), 1);
		assert_eq!(p.stages[0].command, Command::External { args: words(&["ls", "-l", "/tmp"]) });
		assert_eq!(p.stages[0].flags, Flags::default());
	}

	#[test]
	fn pipe_flags() {
		let p = parse_one("cat a | tr a-z A-Z | wc -l");
		let flags: Vec<(bool, bool)> = p.stages.iter().map(|s| (s.flags.pipe_in, s.flags.pipe_out)).collect();
		assert_eq!(flags, vec![(false, true), (true, true), (true, false)]);
		assert!(!p.is_background());
	}

	#[test]
	fn background_marks_first_stage_only() {
		let p = parse_one("sleep 5 | cat &");
		assert!(p.stages[0].flags.background);
		assert!(!p.stages[1].flags.background);
		assert_eq!(p.text, "sleep 5 | cat &");
	}

	#[test]
	fn redirects() {
		let p = parse_one("< in.txt sort > out.txt");
		let s = &p.stages[0];
		assert_eq!(s.command, Command::External { args: words(&["sort"]) });
		assert!(s.flags.redirect_in && s.flags.redirect_out && !s.flags.append);
		assert_eq!(s.redirect_in.as_deref(), Some("in.txt"));
		assert_eq!(s.redirect_out.as_deref(), Some("out.txt"));

		let p = parse_one("echo hi >>log");
		let s = &p.stages[0];
		assert_eq!(s.command, Command::Echo { args: words(&["hi"]) });
		assert!(s.flags.redirect_out && s.flags.append);
		assert_eq!(s.redirect_out.as_deref(), Some("log"));
	}

	#[test]
	fn builtins() {
		assert_eq!(parse_one("export A=b=c").stages[0].command,
		           Command::Export { name: "A".to_string(), value: "b=c".to_string() });
		assert_eq!(parse_one("cd").stages[0].command, Command::ChangeDirectory { path: None });
		assert_eq!(parse_one("cd /tmp").stages[0].command, Command::ChangeDirectory { path: Some("/tmp".to_string()) });
		assert_eq!(parse_one("kill 9 2").stages[0].command, Command::SendSignal { job_id: 2, signal: 9 });
		assert_eq!(parse_one("kill -TERM %3").stages[0].command, Command::SendSignal { job_id: 3, signal: libc::SIGTERM });
		assert_eq!(parse_one("kill SIGINT 1").stages[0].command, Command::SendSignal { job_id: 1, signal: libc::SIGINT });
		assert_eq!(parse_one("pwd").stages[0].command, Command::PrintWorkingDirectory);
		assert_eq!(parse_one("jobs").stages[0].command, Command::ListJobs);
		assert!(parse_one("exit").is_exit());
		assert!(parse_one("quit").is_exit());
	}

	#[test]
	fn variable_expansion() {
		let _guard = PROCESS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
		env::set_var("PISH_TEST_GREETING", "hello");
		env::remove_var("PISH_TEST_UNSET");
		let p = parse_one("echo $PISH_TEST_GREETING $PISH_TEST_UNSET world $");
		assert_eq!(p.stages[0].command, Command::Echo { args: words(&["hello", "world", "$"]) });
	}

	#[test]
	fn errors() {
		assert_eq!(parse(b"| cat"), Err(ParseError::EmptyCommand));
		assert_eq!(parse(b"cat |"), Err(ParseError::EmptyCommand));
		assert_eq!(parse(b"cat >"), Err(ParseError::EmptyRedirect));
		assert_eq!(parse(b"sleep 1 & ls"), Err(ParseError::AfterBackground('l')));
		assert_eq!(parse(b"export"), Err(ParseError::MissingArgument("export")));
		assert_eq!(parse(b"export novalue"), Err(ParseError::InvalidArgument("export", "novalue".to_string())));
		assert_eq!(parse(b"kill 9"), Err(ParseError::MissingArgument("kill")));
		assert_eq!(parse(b"kill NOPE 1"), Err(ParseError::InvalidArgument("kill", "NOPE".to_string())));
	}
}

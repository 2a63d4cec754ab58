use std::io;
use io::Write;
use io::BufRead;

use tracing_subscriber::EnvFilter;

use pish::config::Config;
use pish::error;
use pish::parser;
use pish::{EvalResult,Shell};

fn init_logging(config: &Config) {
	let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));
	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.try_init();
}

fn main() {
	let config = Config::from_env();
	init_logging(&config);

	let mut shell = Shell::new();
	let mut stdout = io::stdout();
	let stdin = io::stdin();
	let mut stdin_locked = stdin.lock();
	loop {
		let _ = stdout.write(config.prompt.as_bytes());
		let _ = stdout.flush();
		let mut line: Vec<u8> = vec![];
		match stdin_locked.read_until(b'\n', &mut line) {
			Ok(0) => break,
			Ok(_) => {},
			Err(e) => {
				error::report(&e);
				break;
			},
		}
		match parser::parse(&line) {
			Ok(Some(pipeline)) => if shell.run_pipeline(&pipeline) == EvalResult::Exit {
				break;
			},
			Ok(None) => { shell.poll_background_jobs(); },
			Err(e) => {
				let _ = writeln!(&mut io::stderr(), "pish: syntax error: {}", e);
			},
		}
	}
}

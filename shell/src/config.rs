use std::env;

const PROMPT_KEY: &str = "PISH_PROMPT";
const LOG_KEY: &str = "PISH_LOG";

const DEFAULT_PROMPT: &str = "pish> ";
const DEFAULT_LOG: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub prompt: String,
	/// A `tracing_subscriber::EnvFilter` directive.
	pub log_filter: String,
}

impl Default for Config {
	fn default() -> Config {
		Config { prompt: DEFAULT_PROMPT.to_string(), log_filter: DEFAULT_LOG.to_string() }
	}
}

impl Config {
	pub fn from_env() -> Config {
		Config::from_lookup(|key| env::var(key).ok())
	}

	fn from_lookup<F>(lookup: F) -> Config where F: Fn(&str) -> Option<String> {
		let default = Config::default();
		Config {
			prompt: lookup(PROMPT_KEY).unwrap_or(default.prompt),
			log_filter: lookup(LOG_KEY).filter(|s| !s.is_empty()).unwrap_or(default.log_filter),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = Config::from_lookup(|_| None);
		assert_eq!(config, Config::default());
		assert_eq!(config.prompt, "pish> ");
	}

	#[test]
	fn overrides() {
		let config = Config::from_lookup(|key| match key {
			"PISH_PROMPT" => Some("$ ".to_string()),
			"PISH_LOG" => Some("pish=debug".to_string()),
			_ => None,
		});
		assert_eq!(config.prompt, "$ ");
		assert_eq!(config.log_filter, "pish=debug");
	}

	#[test]
	fn empty_log_filter_falls_back() {
		let config = Config::from_lookup(|key| if key == "PISH_LOG" { Some(String::new()) } else { None });
		assert_eq!(config.log_filter, "warn");
	}
}

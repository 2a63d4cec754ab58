pub mod types;
pub mod parser;
pub mod error;
pub mod job;
pub mod builtin;
pub mod eval;
pub mod global;
pub mod config;


pub use builtin::lookup_environment;
pub use eval::EvalResult;
pub use global::Shell;

//! Memcache ASCII protocol command parsing.
//!
//! Parses the text subset served by kiln: `get`, `gets`, `set`,
//! `delete`, `incr`, `decr`, and `quit`. Lines arrive already framed
//! (without their terminator); the `set` payload is framed separately
//! by the caller using the byte count carried in the command.

mod command;
mod error;

pub use command::{Command, MAX_KEY_LEN, parse};
pub use error::ParseError;

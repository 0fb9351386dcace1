//! tether-protocol: Line protocol for the tether relay mesh
//!
//! This crate defines the text protocol spoken between the controller and
//! its endpoints (agents, operator clients, websocket bridges). The wire
//! format is newline-delimited UTF-8; the first whitespace-delimited token
//! of a line is the command, the remainder positional arguments.

pub mod codec;
pub mod command;
pub mod error;

pub use codec::{LineCodec, MAX_LINE_LENGTH};
pub use command::{Command, CommandSet, Line};
pub use error::ProtocolError;

pub mod command;

pub use command::{CommandError, CommandKiller, DriverCommand, ExecutableCommand};

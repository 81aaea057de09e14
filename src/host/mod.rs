//! std-backed platform, for running the agent on a development machine.

pub mod console;
pub mod flash;
pub mod net;
pub mod system;

//! Command-line front end for the BrowserMob Proxy engine, and an in-memory
//! emulator of the engine's control API.

pub mod cli;
pub mod emulator;
pub mod logging;
pub mod shutdown;

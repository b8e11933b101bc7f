//! In-memory emulator of the engine's REST control API.
//!
//! Implements allocation, capture sessions and every per-instance setting, but
//! forwards no traffic. Listen and ready delays reproduce a slow engine start.

mod handlers;
mod router;
mod server;
mod state;
mod types;

pub use server::{EmulatorConfig, EmulatorHandle, EmulatorServer};
pub use state::{
    Credentials, EmulatorState, FilterSetting, Instance, RewriteSetting, Session, StateError,
    DEFAULT_FIRST_PORT,
};

//! # Voice Session
//!
//! State machine and resource ownership for one live voice conversation.
//!
//! ## Key Components:
//! - **Controller**: single-owner actor driving `start` / `stop` / `toggle`
//! - **State**: the observable `{ isActive, status, volume }` snapshot
//! - **Resources**: idempotent, drop-safe release of every acquired handle
//!
//! ## State Machine:
//! ```text
//! Disconnected --start--> Connecting --open--> Connected
//!      ^                      |                    |
//!      +------stop/close------+--------------------+
//!                             |                    |
//!                             +------failure-----> Error --start--> Connecting
//! ```

pub mod controller;
pub mod resources;
pub mod state;

pub use controller::{SessionController, SessionHandle};
pub use state::{SessionRecord, SessionSnapshot, SessionStatus};

pub mod error;
pub mod events;
pub mod session;

pub use error::*;
pub use events::session_websocket;
pub use session::*;

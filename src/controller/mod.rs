//! Controller input model
//!
//! [`state`] holds the data types the rest of the bridge passes around
//! ([`ButtonFlags`], [`StickPosition`], [`ControllerState`]) and the decoder
//! for the text line protocol.
//!
//! ```text
//! "0x0012 7 12 34" ──► decode ──► ControllerState ──► Session
//! ```

pub mod state;

pub use state::{decode, ButtonFlags, ControllerState, ProtocolError, StickPosition};

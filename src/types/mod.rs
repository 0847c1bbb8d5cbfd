//! This module contains the types a connection exchanges with the server.

mod capabilities;
pub use self::capabilities::Capabilities;

mod response;
pub use self::response::{Response, Status, TagKind, Token};

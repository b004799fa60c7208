//! Stage handlers: what the server does with each parsed packet.

pub(crate) mod handshaking;
pub(crate) mod login;
pub(crate) mod status;

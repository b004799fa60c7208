//! The game-facing half of the server core: the double-buffered tick arenas,
//! the packet dispatcher that turns framed bodies into typed records and
//! routes them to stage handlers, and the 20 Hz game loop that swaps the
//! arenas.

pub mod dispatch;
pub mod game_loop;
pub mod handler;
pub mod tick_arena;

pub use dispatch::GameHandler;
pub use tick_arena::{ArenaGuard, TickArenas};

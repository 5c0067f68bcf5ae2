//! Price Feed Plumbing
//!
//! The engine never waits on prices. Collaborators push ticks into a
//! `PriceBoard`; settlement reads whatever was recorded last.

pub mod catalog;
pub mod hermes;
pub mod price_board;

pub use catalog::*;
pub use hermes::*;
pub use price_board::*;

//! Convergence scenarios.
//!
//! - `invitation` - sharing a league and seating the invitee on every device
//! - `games` - moves and round completion arriving from other devices

pub mod games;
pub mod invitation;

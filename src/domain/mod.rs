//! Domain types and the ports the application layer talks to.
//!
//! Nothing in here performs I/O; collaborators are reached through the
//! traits in [`ports`].

pub mod booking;
pub mod ports;
pub mod principal;
pub mod schedule;
pub mod teacher;
pub mod window;

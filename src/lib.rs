//! Pose coach — joint-angle exercise coaching.
//!
//! `coach` is the platform-free core; `host` is a headless calloop driver
//! that replays recorded landmark streams through it.

pub mod coach;
pub mod host;

//! zerofeed: incrementally convert PyPI into signed Zero Install feeds.
//!
//! Each run picks up where the previous one stopped: the durable
//! [`state::State`] tracks the last consumed changelog serial and the set of
//! packages that still need (re)conversion. A fixed-size set of cooperative
//! workers drains that set, one package at a time, writing one signed feed
//! per package.

pub mod cli;
pub mod logging;
pub mod sign;
pub mod state;
pub mod update;
pub mod worker;

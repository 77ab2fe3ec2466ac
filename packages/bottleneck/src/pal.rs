//! Platform abstraction layer for the clock source.
//!
//! This module provides a platform abstraction that allows switching between
//! real time sources (monotonic wall clock and the `cpu_time` package) and a fake
//! implementation whose time only moves when a test says so.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;
mod real;

pub(crate) use abstractions::Platform;
pub(crate) use facade::PlatformFacade;
#[cfg(test)]
pub(crate) use fake::FakePlatform;

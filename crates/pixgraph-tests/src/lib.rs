//! Integration test crate for PixGraph.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! Everything runs on `CpuBinding`; no GPU is required.

#[cfg(test)]
mod support;

#[cfg(test)]
mod scenario;

#[cfg(test)]
mod feedback;

#[cfg(test)]
mod multi;

#[cfg(test)]
mod errors;

#[cfg(test)]
mod shared;

#[cfg(test)]
mod gpu;

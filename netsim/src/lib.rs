//! The netsim driver: a small CLI around prebuilt demo simulations.

pub mod cli;
pub mod simulations;

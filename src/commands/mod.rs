//! Command implementations

pub mod action;

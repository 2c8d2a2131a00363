//! Image Reaper CLI - registry retention from the command line.

pub mod commands;
pub mod output;

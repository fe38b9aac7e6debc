// src/lib.rs — Library root for nexus-echo

pub mod cli;
pub mod echo;
pub mod infra;
pub mod persona;
pub mod provider;
pub mod storage;

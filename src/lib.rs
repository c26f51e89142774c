//! multicert - test TLS server that serves a certificate chain chosen by SNI.

pub mod check;
pub mod cli;
pub mod config;
pub mod credential;
pub mod registry;
pub mod serve;

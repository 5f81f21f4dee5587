//! Foundation module - logging setup shared by the binaries

pub mod logging;

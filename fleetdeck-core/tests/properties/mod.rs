//! Property test modules

mod control_tests;
mod probe_tests;
mod safety_tests;
mod uptime_tests;

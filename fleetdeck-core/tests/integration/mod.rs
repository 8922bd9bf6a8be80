//! Integration test modules

mod pool_tests;
mod terminal_tests;
mod workflow_tests;

//! Integration tests for the tandem context stack

mod config_integration;
mod merge_broadcast;
mod read_only;
mod round_trip;
mod save_propagation;
mod stack_lifecycle;
mod test_utils;

//! Per-component unit suites.

mod unit;

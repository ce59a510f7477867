//! Unit tests for the sync module.
//!
//! The test suite is split across focused submodules to keep individual files
//! small while remaining easy to navigate.


mod util;

//! Storage Tests

mod posix_tests;

//! Command-level tests

mod test_build;
mod test_extract;

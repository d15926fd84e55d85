//! Unit test modules.

mod normalizer_test;
mod parser_test;

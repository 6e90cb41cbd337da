mod helpers;
mod lock_tests;
mod read_tests;

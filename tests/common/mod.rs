#![allow(dead_code, unused_imports)]

pub use wavequeue_test_utils::*;

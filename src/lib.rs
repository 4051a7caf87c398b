#![doc = include_str!("../README.md")]
pub mod benchmark;
pub mod compare;
pub mod mul;
pub mod network;
pub mod oram;
pub mod party;
pub mod search;
pub mod share;

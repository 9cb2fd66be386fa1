//! Component F: the syscall facade (spec §4.F) — dispatch numbers plus the
//! argument-fetch/user-pointer/user-string/fd validation helpers that sit
//! between a user-space caller and components A-E and the filesystem
//! contract.

pub mod facade;
pub mod numbers;

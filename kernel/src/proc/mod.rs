//! Component D (`elf`, `stack`) and component E (`process`, `table`,
//! `lifecycle`): everything that creates, clones, runs, and reaps a
//! process (spec §4.D, §4.E).

pub mod elf;
pub mod lifecycle;
pub mod process;
pub mod stack;
pub mod table;

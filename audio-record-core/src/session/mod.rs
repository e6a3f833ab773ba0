pub mod callback;
pub mod container;
pub mod interrupt;
pub mod join;
pub mod raw;
pub mod recorder;
pub mod worker;

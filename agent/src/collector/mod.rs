//! Per-frame collectors owned by the engine

pub mod cpu;
pub mod matrix;

pub use cpu::CpuTimer;
pub use matrix::{observer_slot, MatrixCounts, MatrixHooks, MatrixObserver, ObserverSlot};

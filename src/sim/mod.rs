//! Simulation layer: orchestration, commands, scenario generation, and the
//! CPU reference/verification tooling.

pub mod body_gen;
pub mod commands;
pub mod reference;
pub mod simulation;
pub mod verify;

pub use commands::{Command, CommandQueue};
pub use simulation::GpuSimulation;
pub use verify::{check_tree, TreeDefect};

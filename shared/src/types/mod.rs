//! Data types shared across the workspace

pub mod events;
pub mod profile;
pub mod programs;
pub mod scene;

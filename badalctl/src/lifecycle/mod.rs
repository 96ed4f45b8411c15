//! The token lifecycle engine and its supporting window math.

pub mod engine;
pub mod windows;

pub use engine::LifecycleEngine;
pub use windows::Windows;

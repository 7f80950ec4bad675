//! Hardware Abstraction Layer
//!
//! This module is an extension to `stm32f0xx_hal` that covers some more
//! project-specific hardware: system reset paths and the window watchdog.

pub mod reboot;
pub mod watchdog;

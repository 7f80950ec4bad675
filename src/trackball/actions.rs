pub use crate::utils::Inc;

/// Additional key actions
#[derive(PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum Action {
    /// Use mouse emulation
    Mouse(MouseAction),
    /// Run the tap dance with given index in the tap dance table
    TapDance(u8),
    /// Toggle given layer as the default layer (back to layer 0 when active)
    ToggleLayer(u8),
    /// Reboot to the DFU bootloader
    Bootloader,
}

/// Actions related to mouse emulation
#[derive(PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum MouseAction {
    /// Key emulates a mouse button
    Click(MouseButton),
    /// Auto-click a button at a fixed cadence while the key is held
    RapidFire(MouseButton),
    /// Divert ball motion to scrolling
    DragScroll,
    /// Key changes sensor resolution
    Sensitivity(Inc),
}

/// Emulate a mouse button
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum MouseButton {
    Left,
    Right,
    Mid,
    Back,
    Forward,
}

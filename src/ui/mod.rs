// UI module - console control surface
//
// This module contains:
// - ControlSurface: toggle commands and the labels that reflect session flags
// - ConsoleBridge: wires stdin and state change events to the running engine

pub mod bridge;
pub mod controller;

pub use bridge::ConsoleBridge;
pub use controller::{ControlCommand, ControlLabels, ControlSurface};

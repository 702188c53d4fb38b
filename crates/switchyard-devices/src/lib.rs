//! Reference electrical components for switchyard.
//!
//! Every device implements [`switchyard_core::Component`] and works in both
//! the EMT and DP domains:
//! - Passive elements: R, C, L (trapezoidal companion models)
//! - Independent voltage and current sources with sinusoidal waveforms
//! - Switch with open/closed resistances

pub mod passive;
pub mod sources;
pub mod switch;

pub use passive::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, Sinusoid, VoltageSource};
pub use switch::Switch;

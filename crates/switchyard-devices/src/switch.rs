//! Ideal-ish switch with distinct open and closed resistances.

use num_complex::Complex64;
use switchyard_core::{
    Component, Error, EventAction, EventEffect, NodeId, Result, SolutionView, StampBuffer,
    StampContext,
};

use crate::passive::positive;

/// A two-terminal switch.
///
/// Both states stamp a conductance between the terminals, so toggling the
/// switch changes values but never the matrix structure. A state change is
/// still reported as a topology effect because connectivity changed.
#[derive(Debug, Clone)]
pub struct Switch {
    pub name: String,
    pub node_pos: NodeId,
    pub node_neg: NodeId,
    /// Resistance while open (Ω).
    pub open_resistance: f64,
    /// Resistance while closed (Ω).
    pub closed_resistance: f64,
    closed: bool,
    current: Complex64,
}

impl Switch {
    pub fn new(
        name: impl Into<String>,
        node_pos: NodeId,
        node_neg: NodeId,
        open_resistance: f64,
        closed_resistance: f64,
        closed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos,
            node_neg,
            open_resistance,
            closed_resistance,
            closed,
            current: Complex64::new(0.0, 0.0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Active resistance for the current state.
    pub fn resistance(&self) -> f64 {
        if self.closed {
            self.closed_resistance
        } else {
            self.open_resistance
        }
    }
}

impl Component for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_pos, self.node_neg]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        let r = positive(&self.name, "resistance", self.resistance())?;
        buffer.stamp_conductance(ctx.node(self.node_pos), ctx.node(self.node_neg), 1.0 / r);
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, solution: &SolutionView<'_>, _ctx: &StampContext<'_>) {
        self.current = solution.voltage_across(self.node_pos, self.node_neg) / self.resistance();
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        match action {
            EventAction::SetClosed(closed) if *closed == self.closed => Ok(EventEffect::None),
            EventAction::SetClosed(closed) => {
                self.closed = *closed;
                log::debug!(
                    "switch {} {}",
                    self.name,
                    if self.closed { "closed" } else { "opened" }
                );
                Ok(EventEffect::Topology)
            }
            EventAction::SetParameter { name, value } => {
                let slot = match name.as_str() {
                    "open_resistance" => &mut self.open_resistance,
                    "closed_resistance" => &mut self.closed_resistance,
                    _ => {
                        return Err(Error::InvalidParameter {
                            component: self.name.clone(),
                            parameter: name.clone(),
                        });
                    }
                };
                *slot = positive(&self.name, name, *value)?;
                Ok(EventEffect::Values)
            }
            EventAction::Remove => Err(Error::UnsupportedEvent {
                component: self.name.clone(),
                action: action.to_string(),
            }),
        }
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.current)
    }
}

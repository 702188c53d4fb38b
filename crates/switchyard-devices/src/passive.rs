//! Passive device models: Resistor, Capacitor, Inductor.
//!
//! Reactive elements use trapezoidal companion models. The same equations
//! serve both domains: in EMT the angular frequency from the stamp context
//! is zero and every complex quantity stays on the real axis.

use num_complex::Complex64;
use switchyard_core::{
    Component, Error, EventAction, EventEffect, NodeId, Result, SolutionView, StampBuffer,
    StampContext,
};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Reject non-positive or non-finite element values.
pub(crate) fn positive(name: &str, parameter: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Component {
            name: name.to_string(),
            message: format!("{parameter} must be positive, got {value}"),
        })
    }
}

/// Apply a `SetParameter` event to the single parameter a device exposes.
fn set_single_parameter(
    device: &str,
    expected: &str,
    action: &EventAction,
    target: &mut f64,
) -> Result<EventEffect> {
    match action {
        EventAction::SetParameter { name, value } if name == expected => {
            *target = positive(device, expected, *value)?;
            Ok(EventEffect::Values)
        }
        EventAction::SetParameter { name, .. } => Err(Error::InvalidParameter {
            component: device.to_string(),
            parameter: name.clone(),
        }),
        other => Err(Error::UnsupportedEvent {
            component: device.to_string(),
            action: other.to_string(),
        }),
    }
}

/// A resistor element.
#[derive(Debug, Clone)]
pub struct Resistor {
    /// Device name (e.g., "R1").
    pub name: String,
    /// Positive terminal node.
    pub node_pos: NodeId,
    /// Negative terminal node.
    pub node_neg: NodeId,
    /// Resistance value in ohms.
    pub resistance: f64,
    current: Complex64,
}

impl Resistor {
    pub fn new(
        name: impl Into<String>,
        node_pos: NodeId,
        node_neg: NodeId,
        resistance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos,
            node_neg,
            resistance,
            current: ZERO,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Component for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_pos, self.node_neg]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        positive(&self.name, "resistance", self.resistance)?;
        let i = ctx.node(self.node_pos);
        let j = ctx.node(self.node_neg);
        buffer.stamp_conductance(i, j, self.conductance());
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, solution: &SolutionView<'_>, _ctx: &StampContext<'_>) {
        self.current = solution.voltage_across(self.node_pos, self.node_neg) * self.conductance();
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        set_single_parameter(&self.name, "resistance", action, &mut self.resistance)
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.current)
    }
}

/// A capacitor with trapezoidal companion model.
///
/// C is replaced by `Geq = 2C/h + jωC` in parallel with a history source
/// `Ieq = (2C/h - jωC) v_prev + i_prev` injected into the positive node.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub node_pos: NodeId,
    pub node_neg: NodeId,
    /// Capacitance (F).
    pub capacitance: f64,
    /// Voltage at previous timestep.
    v_prev: Complex64,
    /// Current at previous timestep.
    i_prev: Complex64,
}

impl Capacitor {
    pub fn new(
        name: impl Into<String>,
        node_pos: NodeId,
        node_neg: NodeId,
        capacitance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos,
            node_neg,
            capacitance,
            v_prev: ZERO,
            i_prev: ZERO,
        }
    }

    /// Start from a charged state instead of zero.
    pub fn with_initial_voltage(mut self, voltage: f64) -> Self {
        self.v_prev = Complex64::new(voltage, 0.0);
        self
    }

    /// Voltage across the capacitor after the last step.
    pub fn voltage(&self) -> Complex64 {
        self.v_prev
    }

    fn conductance(&self, ctx: &StampContext<'_>) -> Complex64 {
        Complex64::new(
            2.0 * self.capacitance / ctx.time_step,
            ctx.omega() * self.capacitance,
        )
    }

    fn history(&self, ctx: &StampContext<'_>) -> Complex64 {
        let g = Complex64::new(
            2.0 * self.capacitance / ctx.time_step,
            -ctx.omega() * self.capacitance,
        );
        g * self.v_prev + self.i_prev
    }
}

impl Component for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_pos, self.node_neg]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        positive(&self.name, "capacitance", self.capacitance)?;
        let i = ctx.node(self.node_pos);
        let j = ctx.node(self.node_neg);
        buffer.stamp_admittance(i, j, self.conductance(ctx));
        buffer.stamp_current_source(j, i, self.history(ctx));
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, solution: &SolutionView<'_>, ctx: &StampContext<'_>) {
        let v_new = solution.voltage_across(self.node_pos, self.node_neg);
        self.i_prev = self.conductance(ctx) * v_new - self.history(ctx);
        self.v_prev = v_new;
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        set_single_parameter(&self.name, "capacitance", action, &mut self.capacitance)
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.i_prev)
    }
}

/// An inductor with trapezoidal companion model.
///
/// With `a = h/2L` and `b = jωh/2`, L is replaced by `Geq = a/(1+b)` in
/// parallel with a history source `Ieq = (1-b)/(1+b) i_prev + Geq v_prev`
/// flowing from the positive to the negative node.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub node_pos: NodeId,
    pub node_neg: NodeId,
    /// Inductance (H).
    pub inductance: f64,
    v_prev: Complex64,
    i_prev: Complex64,
}

impl Inductor {
    pub fn new(
        name: impl Into<String>,
        node_pos: NodeId,
        node_neg: NodeId,
        inductance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos,
            node_neg,
            inductance,
            v_prev: ZERO,
            i_prev: ZERO,
        }
    }

    /// Start with a current already flowing.
    pub fn with_initial_current(mut self, current: f64) -> Self {
        self.i_prev = Complex64::new(current, 0.0);
        self
    }

    fn coefficients(&self, ctx: &StampContext<'_>) -> (Complex64, Complex64) {
        let a = Complex64::new(ctx.time_step / (2.0 * self.inductance), 0.0);
        let b = Complex64::new(0.0, ctx.omega() * ctx.time_step / 2.0);
        let one = Complex64::new(1.0, 0.0);
        let geq = a / (one + b);
        let decay = (one - b) / (one + b);
        (geq, decay)
    }

    fn history(&self, ctx: &StampContext<'_>) -> Complex64 {
        let (geq, decay) = self.coefficients(ctx);
        decay * self.i_prev + geq * self.v_prev
    }
}

impl Component for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_pos, self.node_neg]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        positive(&self.name, "inductance", self.inductance)?;
        let i = ctx.node(self.node_pos);
        let j = ctx.node(self.node_neg);
        let (geq, _) = self.coefficients(ctx);
        buffer.stamp_admittance(i, j, geq);
        buffer.stamp_current_source(i, j, self.history(ctx));
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, solution: &SolutionView<'_>, ctx: &StampContext<'_>) {
        let v_new = solution.voltage_across(self.node_pos, self.node_neg);
        let (geq, _) = self.coefficients(ctx);
        self.i_prev = geq * v_new + self.history(ctx);
        self.v_prev = v_new;
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        set_single_parameter(&self.name, "inductance", action, &mut self.inductance)
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.i_prev)
    }
}

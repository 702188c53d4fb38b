//! Independent source models: Voltage and Current sources.

use num_complex::Complex64;
use std::f64::consts::PI;
use switchyard_core::{
    Component, Domain, Error, EventAction, EventEffect, NodeId, Result, SolutionView, StampBuffer,
    StampContext,
};

/// Sinusoidal source waveform `|X| cos(2πft + φ)`. A frequency of zero
/// gives a constant value of `|X| cos φ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sinusoid {
    /// Peak magnitude.
    pub magnitude: f64,
    /// Phase in radians.
    pub phase: f64,
    /// Frequency in Hz.
    pub frequency: f64,
}

impl Sinusoid {
    pub fn new(magnitude: f64, phase: f64, frequency: f64) -> Self {
        Self {
            magnitude,
            phase,
            frequency,
        }
    }

    /// Constant value.
    pub fn dc(value: f64) -> Self {
        Self::new(value, 0.0, 0.0)
    }

    /// Source value at the context's time in the context's domain.
    ///
    /// EMT returns the instantaneous value. DP returns the phasor
    /// `|X| e^{jφ}` rotated by the offset from the system frequency.
    pub fn value(&self, ctx: &StampContext<'_>) -> Complex64 {
        match ctx.domain() {
            Domain::Emt => Complex64::new(
                self.magnitude * (2.0 * PI * self.frequency * ctx.time + self.phase).cos(),
                0.0,
            ),
            Domain::Dp => {
                let shift = 2.0 * PI * (self.frequency - ctx.system_frequency) * ctx.time;
                Complex64::from_polar(self.magnitude, self.phase + shift)
            }
        }
    }

    fn set(&mut self, device: &str, action: &EventAction) -> Result<EventEffect> {
        match action {
            EventAction::SetParameter { name, value } => {
                let slot = match name.as_str() {
                    "magnitude" | "voltage" | "current" => &mut self.magnitude,
                    "phase" => &mut self.phase,
                    "frequency" => &mut self.frequency,
                    _ => {
                        return Err(Error::InvalidParameter {
                            component: device.to_string(),
                            parameter: name.clone(),
                        });
                    }
                };
                if !value.is_finite() {
                    return Err(Error::Component {
                        name: device.to_string(),
                        message: format!("{name} must be finite, got {value}"),
                    });
                }
                *slot = *value;
                // Sources only drive the right-hand side.
                Ok(EventEffect::Values)
            }
            other => Err(Error::UnsupportedEvent {
                component: device.to_string(),
                action: other.to_string(),
            }),
        }
    }
}

/// An independent voltage source.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    /// Device name (e.g., "V1").
    pub name: String,
    /// Positive terminal node.
    pub node_pos: NodeId,
    /// Negative terminal node.
    pub node_neg: NodeId,
    pub waveform: Sinusoid,
    /// Branch current from the last step, flowing from the positive node
    /// through the source.
    current: Complex64,
}

impl VoltageSource {
    pub fn new(
        name: impl Into<String>,
        node_pos: NodeId,
        node_neg: NodeId,
        waveform: Sinusoid,
    ) -> Self {
        Self {
            name: name.into(),
            node_pos,
            node_neg,
            waveform,
            current: Complex64::new(0.0, 0.0),
        }
    }

    /// Constant voltage source.
    pub fn dc(name: impl Into<String>, node_pos: NodeId, node_neg: NodeId, voltage: f64) -> Self {
        Self::new(name, node_pos, node_neg, Sinusoid::dc(voltage))
    }
}

impl Component for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_pos, self.node_neg]
    }

    fn branch_count(&self) -> usize {
        1
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        let i = ctx.node(self.node_pos);
        let j = ctx.node(self.node_neg);
        let branch = ctx.branch(0)?;
        buffer.stamp_voltage_source(i, j, branch, self.waveform.value(ctx));
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, solution: &SolutionView<'_>, _ctx: &StampContext<'_>) {
        self.current = solution.branch_current(0);
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        self.waveform.set(&self.name, action)
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.current)
    }
}

/// An independent current source driving current from `node_from`
/// through the source into `node_to`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub node_from: NodeId,
    pub node_to: NodeId,
    pub waveform: Sinusoid,
    current: Complex64,
}

impl CurrentSource {
    pub fn new(
        name: impl Into<String>,
        node_from: NodeId,
        node_to: NodeId,
        waveform: Sinusoid,
    ) -> Self {
        Self {
            name: name.into(),
            node_from,
            node_to,
            waveform,
            current: Complex64::new(0.0, 0.0),
        }
    }

    /// Constant current source.
    pub fn dc(name: impl Into<String>, node_from: NodeId, node_to: NodeId, current: f64) -> Self {
        Self::new(name, node_from, node_to, Sinusoid::dc(current))
    }
}

impl Component for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node_from, self.node_to]
    }

    fn stamp(&self, buffer: &mut StampBuffer, ctx: &StampContext<'_>) -> Result<()> {
        let i = ctx.node(self.node_from);
        let j = ctx.node(self.node_to);
        buffer.stamp_current_source(i, j, self.waveform.value(ctx));
        Ok(())
    }

    fn has_post_step(&self) -> bool {
        true
    }

    fn post_step(&mut self, _solution: &SolutionView<'_>, ctx: &StampContext<'_>) {
        self.current = self.waveform.value(ctx);
    }

    fn apply_event(&mut self, action: &EventAction) -> Result<EventEffect> {
        self.waveform.set(&self.name, action)
    }

    fn current(&self) -> Option<Complex64> {
        Some(self.current)
    }
}

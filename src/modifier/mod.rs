//! Stateful signal modifiers
//!
//! Each slot owns a [`ModifierChain`]: an ordered list of filters that reshape
//! the logical controller message once per worker tick, before the remap
//! table turns it into output events. Filters keep private state across
//! ticks (accumulators, autofire phase, previous dpad direction).

pub mod autofire;
pub mod calibration;
pub mod deadzone;
pub mod relative_axis;
pub mod restrictor;
pub mod sensitivity;
pub mod square_axis;

pub use autofire::AutofireModifier;
pub use calibration::CalibrationModifier;
pub use deadzone::DeadzoneModifier;
pub use relative_axis::RelativeAxisModifier;
pub use restrictor::{DpadRotationModifier, FourWayRestrictorModifier};
pub use sensitivity::SensitivityModifier;
pub use square_axis::SquareAxisModifier;

use crate::controller::{Axis, Button, GenericInputMessage};
use log::debug;
use serde::{Deserialize, Serialize};

/// Position of a filter in the chain
///
/// The chain sorts its filters by stage so axis shaping always happens before
/// the relative-axis integrator consumes the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Calibration,
    Deadzone,
    Shaping,
    Buttons,
    Integrator,
}

pub trait Modifier: Send {
    /// Transform `msg` in place; `msec_delta` is the time since the previous tick
    fn update(&mut self, msec_delta: u32, msg: &mut GenericInputMessage);

    fn stage(&self) -> Stage;

    /// Short human readable description for logs
    fn describe(&self) -> String;
}

/// Ordered, per-slot filter pipeline
#[derive(Default)]
pub struct ModifierChain {
    modifiers: Vec<Box<dyn Modifier>>,
}

impl ModifierChain {
    pub fn new(mut modifiers: Vec<Box<dyn Modifier>>) -> Self {
        // stable: config order is kept within a stage
        modifiers.sort_by_key(|m| m.stage());
        for m in &modifiers {
            debug!("  modifier: {}", m.describe());
        }
        Self { modifiers }
    }

    /// Build a chain from its config description
    pub fn from_specs(specs: &[ModifierSpec]) -> Result<Self, String> {
        let modifiers = specs.iter().map(ModifierSpec::build).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(modifiers))
    }

    pub fn update(&mut self, msec_delta: u32, msg: &mut GenericInputMessage) {
        for m in self.modifiers.iter_mut() {
            m.update(msec_delta, msg);
        }
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Stages in execution order
    pub fn stages(&self) -> Vec<Stage> {
        self.modifiers.iter().map(|m| m.stage()).collect()
    }
}

fn default_relative_speed() -> i32 {
    10000
}

fn default_sensitivity() -> f32 {
    0.0
}

/// Modifier as written in the slot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModifierSpec {
    RelativeAxis {
        axis: String,
        #[serde(default = "default_relative_speed")]
        speed: i32,
    },
    SquareAxis,
    Autofire {
        button: String,
        frequency: u32,
    },
    Calibration {
        axis: String,
        min: i32,
        center: i32,
        max: i32,
    },
    Sensitivity {
        axis: String,
        #[serde(default = "default_sensitivity")]
        value: f32,
    },
    Deadzone {
        axis: String,
        threshold: i32,
        #[serde(default)]
        smooth: bool,
    },
    FourWay,
    DpadRotation {
        degrees: i32,
    },
}

fn parse_axis(name: &str) -> Result<Axis, String> {
    name.parse::<Axis>()
}

impl ModifierSpec {
    /// Instantiate the filter, checking its parameters
    pub fn build(&self) -> Result<Box<dyn Modifier>, String> {
        Ok(match self {
            ModifierSpec::RelativeAxis { axis, speed } => {
                Box::new(RelativeAxisModifier::new(vec![(parse_axis(axis)?, *speed)]))
            }
            ModifierSpec::SquareAxis => Box::new(SquareAxisModifier::new()),
            ModifierSpec::Autofire { button, frequency } => {
                let button = button.parse::<Button>()?;
                if *frequency == 0 {
                    return Err(format!("autofire frequency for {} must be positive", button));
                }
                Box::new(AutofireModifier::new(button, *frequency))
            }
            ModifierSpec::Calibration { axis, min, center, max } => {
                let axis = parse_axis(axis)?;
                if !(min < center && center < max) {
                    return Err(format!(
                        "calibration for {} needs min < center < max, got {} {} {}",
                        axis, min, center, max
                    ));
                }
                Box::new(CalibrationModifier::new(axis, *min, *center, *max))
            }
            ModifierSpec::Sensitivity { axis, value } => {
                if !value.is_finite() {
                    return Err(format!("sensitivity for {} must be a finite number", axis));
                }
                Box::new(SensitivityModifier::new(parse_axis(axis)?, *value))
            }
            ModifierSpec::Deadzone { axis, threshold, smooth } => {
                let axis = parse_axis(axis)?;
                if *threshold < 0 || *threshold >= axis.max() {
                    return Err(format!(
                        "deadzone for {} must be within 0..{}, got {}",
                        axis,
                        axis.max(),
                        threshold
                    ));
                }
                Box::new(DeadzoneModifier::new(axis, *threshold, *smooth))
            }
            ModifierSpec::FourWay => Box::new(FourWayRestrictorModifier::new()),
            ModifierSpec::DpadRotation { degrees } => {
                if degrees % 45 != 0 {
                    return Err(format!("dpad rotation must be a multiple of 45, got {}", degrees));
                }
                Box::new(DpadRotationModifier::new(*degrees))
            }
        })
    }

    /// Axis this modifier reads from, if any
    pub fn axis(&self) -> Option<&str> {
        match self {
            ModifierSpec::RelativeAxis { axis, .. }
            | ModifierSpec::Calibration { axis, .. }
            | ModifierSpec::Sensitivity { axis, .. }
            | ModifierSpec::Deadzone { axis, .. } => Some(axis),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_sorts_by_stage() {
        let specs = vec![
            ModifierSpec::RelativeAxis { axis: "X1".into(), speed: 100 },
            ModifierSpec::Autofire { button: "A".into(), frequency: 50 },
            ModifierSpec::SquareAxis,
            ModifierSpec::Deadzone { axis: "X1".into(), threshold: 1000, smooth: false },
            ModifierSpec::Calibration { axis: "Y1".into(), min: -30000, center: 0, max: 30000 },
        ];
        let chain = ModifierChain::from_specs(&specs).unwrap();
        assert_eq!(
            chain.stages(),
            vec![Stage::Calibration, Stage::Deadzone, Stage::Shaping, Stage::Buttons, Stage::Integrator]
        );
    }

    #[test]
    fn test_deadzone_runs_before_integrator_regardless_of_order() {
        let specs = vec![
            ModifierSpec::RelativeAxis { axis: "X1".into(), speed: 32768 },
            ModifierSpec::Deadzone { axis: "X1".into(), threshold: 20000, smooth: false },
        ];
        let mut chain = ModifierChain::from_specs(&specs).unwrap();
        let mut msg = GenericInputMessage::new();
        msg.set_axis(Axis::X1, 16384);
        chain.update(1000, &mut msg);
        // zeroed by the deadzone first, so the integrator holds at 0
        assert_eq!(msg.get_axis(Axis::X1), 0);
    }

    #[test]
    fn test_spec_validation() {
        assert!(ModifierSpec::Autofire { button: "A".into(), frequency: 0 }.build().is_err());
        assert!(ModifierSpec::Autofire { button: "Nope".into(), frequency: 10 }.build().is_err());
        assert!(ModifierSpec::Calibration { axis: "X1".into(), min: 0, center: 0, max: 10 }
            .build()
            .is_err());
        assert!(ModifierSpec::Deadzone { axis: "LT".into(), threshold: 300, smooth: false }
            .build()
            .is_err());
        assert!(ModifierSpec::DpadRotation { degrees: 30 }.build().is_err());
        assert!(ModifierSpec::DpadRotation { degrees: -90 }.build().is_ok());
        assert!(ModifierSpec::RelativeAxis { axis: "Z9".into(), speed: 1 }.build().is_err());
    }

    #[test]
    fn test_spec_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            modifiers: Vec<ModifierSpec>,
        }
        let text = r#"
            [[modifiers]]
            type = "relative_axis"
            axis = "X1"
            speed = 32768

            [[modifiers]]
            type = "square_axis"

            [[modifiers]]
            type = "deadzone"
            axis = "Y2"
            threshold = 4000
            smooth = true
        "#;
        let wrapper: Wrapper = toml::from_str(text).unwrap();
        assert_eq!(wrapper.modifiers.len(), 3);
        assert_eq!(
            wrapper.modifiers[0],
            ModifierSpec::RelativeAxis { axis: "X1".into(), speed: 32768 }
        );
        assert_eq!(wrapper.modifiers[1], ModifierSpec::SquareAxis);
        assert_eq!(wrapper.modifiers[2].axis(), Some("Y2"));
    }
}

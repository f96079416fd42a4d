//! Online parameter updates
//!
//! Each message carries one changed parameter. Messages are queued on a
//! channel and applied by the controller at the start of its next cycle,
//! so a solve never sees a half-applied change.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde::{Deserialize, Serialize};

use tiltqd_core::disturbance::WrenchAxis;

use crate::config::WeightGroup;
use crate::error::ConfigError;

/// One changed parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterUpdate {
    /// Cost weight of a diagonal group
    CostWeight { group: WeightGroup, value: f64 },
    /// Disturbance observer integral gain
    IntegralGain { axis: WrenchAxis, value: f64 },
    /// Disturbance observer saturation limit
    SaturationLimit { axis: WrenchAxis, value: f64 },
}

impl ParameterUpdate {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ParameterUpdate::CostWeight { group, value } => {
                if !(value >= 0.0 && value.is_finite()) {
                    return Err(ConfigError::invalid(
                        "weights",
                        format!("{group:?} = {value} (must be finite and >= 0)"),
                    ));
                }
            }
            ParameterUpdate::IntegralGain { axis, value } => {
                if !value.is_finite() {
                    return Err(ConfigError::invalid("disturbance.gains", format!("{axis:?} is not finite")));
                }
            }
            ParameterUpdate::SaturationLimit { axis, value } => {
                if !(value >= 0.0 && value.is_finite()) {
                    return Err(ConfigError::invalid(
                        "disturbance.limits",
                        format!("{axis:?} = {value} (must be finite and >= 0)"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Sending side, cloneable across threads
#[derive(Debug, Clone)]
pub struct ReconfigureHandle {
    tx: Sender<ParameterUpdate>,
}

impl ReconfigureHandle {
    /// Queue an update; invalid values are rejected here
    pub fn send(&self, update: ParameterUpdate) -> Result<(), ConfigError> {
        update.validate()?;
        self.tx
            .send(update)
            .map_err(|_| ConfigError::invalid("reconfigure", "controller has been dropped"))
    }
}

/// Receiving side, owned by the controller
#[derive(Debug)]
pub struct ReconfigureQueue {
    rx: Receiver<ParameterUpdate>,
}

impl ReconfigureQueue {
    /// Everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<ParameterUpdate> {
        let mut updates = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(update) => updates.push(update),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        updates
    }
}

/// Create a connected handle/queue pair
pub fn channel() -> (ReconfigureHandle, ReconfigureQueue) {
    let (tx, rx) = mpsc::channel();
    (ReconfigureHandle { tx }, ReconfigureQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_drained_in_order() {
        let (handle, queue) = channel();
        handle
            .send(ParameterUpdate::CostWeight { group: WeightGroup::PositionZ, value: 10.0 })
            .unwrap();
        handle
            .send(ParameterUpdate::IntegralGain { axis: WrenchAxis::Yaw, value: 0.2 })
            .unwrap();

        let updates = queue.drain();
        assert_eq!(updates.len(), 2);
        assert!(matches!(updates[1], ParameterUpdate::IntegralGain { axis: WrenchAxis::Yaw, .. }));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_negative_weight_rejected_at_send() {
        let (handle, queue) = channel();
        let result = handle.send(ParameterUpdate::CostWeight { group: WeightGroup::Thrust, value: -1.0 });
        assert!(result.is_err());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_negative_limit_rejected() {
        let update = ParameterUpdate::SaturationLimit { axis: WrenchAxis::X, value: -0.1 };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_send_after_queue_dropped() {
        let (handle, queue) = channel();
        drop(queue);
        let result = handle.send(ParameterUpdate::IntegralGain { axis: WrenchAxis::X, value: 1.0 });
        assert!(result.is_err());
    }

    #[test]
    fn test_update_from_toml() {
        let update: ParameterUpdate =
            toml::from_str("kind = \"cost_weight\"\ngroup = \"position_xy\"\nvalue = 120.0\n").unwrap();
        assert_eq!(
            update,
            ParameterUpdate::CostWeight { group: WeightGroup::PositionXy, value: 120.0 }
        );
    }
}

//! Cane battery model: linear drain, charge from the recharge threshold until full.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryParams {
    pub drain_per_tick: f64,
    pub charge_per_tick: f64,
    pub recharge_threshold: i32,
    pub low_threshold: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Percent, 0..=100
    pub level: f64,
    pub charging: bool,
}

/// What happened to the battery during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryTick {
    pub level: i32,
    pub charging: bool,
    /// Crossed the low-battery threshold going down
    pub became_low: bool,
    pub started_charging: bool,
}

#[derive(Debug, Clone)]
pub struct BatterySimulator {
    params: BatteryParams,
    state: BatteryState,
}

impl BatterySimulator {
    pub fn new(params: BatteryParams, initial_level: f64) -> Self {
        Self {
            params,
            state: BatteryState {
                level: initial_level.clamp(0.0, 100.0),
                charging: false,
            },
        }
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn level(&self) -> i32 {
        self.state.level.round() as i32
    }

    pub fn tick(&mut self) -> BatteryTick {
        let before = self.level();
        let mut started_charging = false;

        if self.state.charging {
            self.state.level = (self.state.level + self.params.charge_per_tick).min(100.0);
            if self.state.level >= 100.0 {
                self.state.charging = false;
            }
        } else {
            self.state.level = (self.state.level - self.params.drain_per_tick).max(0.0);
            if self.level() <= self.params.recharge_threshold {
                self.state.charging = true;
                started_charging = true;
            }
        }

        let level = self.level();
        BatteryTick {
            level,
            charging: self.state.charging,
            became_low: before > self.params.low_threshold && level <= self.params.low_threshold,
            started_charging,
        }
    }
}

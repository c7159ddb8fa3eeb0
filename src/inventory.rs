//! Pen (ink reservoir) inventory.
//!
//! Every mutation rewrites the whole inventory file before returning, so the
//! on-disk view never lags a confirmed deduction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LinecraftError, Result};
use crate::store;

pub const DEFAULT_RESERVOIR_ID: &str = "default_pen";
pub const DEFAULT_RESERVOIR_NAME: &str = "Standard Black (200m)";
pub const DEFAULT_CAPACITY_M: f64 = 200.0;

/// One pen. Lengths are in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservoir {
    pub name: String,
    pub capacity: f64,
    #[serde(default)]
    pub used: f64,
}

impl Reservoir {
    pub fn remaining(&self) -> f64 {
        (self.capacity - self.used).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct InventoryFile {
    active_reservoir_id: Option<String>,
    #[serde(default)]
    reservoirs: BTreeMap<String, Reservoir>,
}

#[derive(Debug)]
pub struct ConsumableInventory {
    path: PathBuf,
    state: InventoryFile,
}

impl ConsumableInventory {
    /// Opens the inventory at `path`, seeding and saving the default pen when
    /// the file does not exist. A corrupt file is reported, never replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match store::read_json::<InventoryFile>(&path)? {
            Some(state) => Ok(Self { path, state }),
            None => {
                let mut state = InventoryFile::default();
                state.reservoirs.insert(
                    DEFAULT_RESERVOIR_ID.to_string(),
                    Reservoir {
                        name: DEFAULT_RESERVOIR_NAME.to_string(),
                        capacity: DEFAULT_CAPACITY_M,
                        used: 0.0,
                    },
                );
                state.active_reservoir_id = Some(DEFAULT_RESERVOIR_ID.to_string());
                let inventory = Self { path, state };
                inventory.save()?;
                info!(path = %inventory.path.display(), "created default pen inventory");
                Ok(inventory)
            }
        }
    }

    fn save(&self) -> Result<()> {
        store::write_json(&self.path, &self.state)
    }

    /// Writes `next` and only then adopts it, so a failed write leaves
    /// memory and disk agreeing on the previous state.
    fn commit(&mut self, next: InventoryFile) -> Result<()> {
        store::write_json(&self.path, &next)?;
        self.state = next;
        Ok(())
    }

    /// Registers a new pen and makes it active. Returns its id.
    pub fn add_reservoir(&mut self, name: &str, capacity: f64) -> Result<String> {
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(LinecraftError::Validation(format!(
                "pen capacity must be a non-negative number, got {capacity}"
            )));
        }
        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let mut next = self.state.clone();
        next.reservoirs.insert(
            id.clone(),
            Reservoir {
                name: name.to_string(),
                capacity,
                used: 0.0,
            },
        );
        next.active_reservoir_id = Some(id.clone());
        self.commit(next)?;
        info!(pen = %id, name, capacity, "pen added");
        Ok(id)
    }

    /// Switches the active pen. `Ok(false)` for an unknown id.
    pub fn set_active(&mut self, id: &str) -> Result<bool> {
        if !self.state.reservoirs.contains_key(id) {
            return Ok(false);
        }
        let mut next = self.state.clone();
        next.active_reservoir_id = Some(id.to_string());
        self.commit(next)?;
        Ok(true)
    }

    /// Adds `amount` meters to the active pen's usage. Returns whether a pen
    /// was charged.
    pub fn deduct(&mut self, amount: f64) -> Result<bool> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LinecraftError::Validation(format!(
                "ink amount must be a non-negative number, got {amount}"
            )));
        }
        let mut next = self.state.clone();
        let Some(reservoir) = next
            .active_reservoir_id
            .as_ref()
            .and_then(|id| next.reservoirs.get_mut(id))
        else {
            warn!(amount, "no active pen; ink not charged to any reservoir");
            return Ok(false);
        };
        reservoir.used += amount;
        self.commit(next)?;
        Ok(true)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.state.active_reservoir_id.as_deref()
    }

    pub fn active(&self) -> Option<&Reservoir> {
        self.active_id().and_then(|id| self.state.reservoirs.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Reservoir> {
        self.state.reservoirs.get(id)
    }

    pub fn reservoirs(&self) -> &BTreeMap<String, Reservoir> {
        &self.state.reservoirs
    }
}

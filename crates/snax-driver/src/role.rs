// SPDX-License-Identifier: AGPL-3.0-only

//! Role dispatch
//!
//! Which unit moves data and which one drives the accelerator is a property
//! of the cluster wiring, not of the running code. The topology is injected
//! once, validated once, and every later question is a pure lookup.

use crate::error::{Result, SnaxError};
use snax_chip::cluster::ClusterShape;

/// Index of one execution unit (core) in the cluster.
pub type UnitId = u32;

/// Function an execution unit performs during a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Issues load and store transfers.
    DataMover,
    /// Configures the accelerator and waits for it.
    Compute,
    /// Only takes part in barriers.
    Idle,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataMover => write!(f, "data-mover"),
            Self::Compute => write!(f, "compute"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// Static cluster wiring: how many units exist and which hold the active roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTopology {
    units: u32,
    mover: UnitId,
    compute: UnitId,
}

impl ClusterTopology {
    /// Create and validate a topology.
    ///
    /// # Errors
    ///
    /// Returns error if the cluster is empty, a role index is out of range,
    /// or the same unit would hold both roles.
    pub fn new(units: u32, mover: UnitId, compute: UnitId) -> Result<Self> {
        if units < 2 {
            return Err(SnaxError::invalid_topology(format!(
                "need at least 2 units for a mover and a compute unit, got {units}"
            )));
        }
        if mover >= units || compute >= units {
            return Err(SnaxError::invalid_topology(format!(
                "role index out of range: mover={mover} compute={compute} units={units}"
            )));
        }
        if mover == compute {
            return Err(SnaxError::invalid_topology(format!(
                "unit {mover} cannot be both data mover and compute unit"
            )));
        }
        Ok(Self { units, mover, compute })
    }

    /// Reference SNAX cluster: core 8 moves data, core 0 drives the accelerator.
    pub const fn snax() -> Self {
        let shape = ClusterShape::SNAX;
        Self {
            units: shape.cores,
            mover: shape.dm_core,
            compute: shape.accel_core,
        }
    }

    /// Number of units taking part in barriers.
    pub const fn unit_count(&self) -> u32 {
        self.units
    }

    /// The data-mover unit.
    pub const fn mover(&self) -> UnitId {
        self.mover
    }

    /// The compute unit.
    pub const fn compute(&self) -> UnitId {
        self.compute
    }

    /// All unit ids.
    pub fn units(&self) -> impl Iterator<Item = UnitId> {
        0..self.units
    }
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self::snax()
    }
}

/// Pure, total classification of units into roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleDispatcher {
    topology: ClusterTopology,
}

impl RoleDispatcher {
    /// Create a dispatcher over a validated topology.
    pub const fn new(topology: ClusterTopology) -> Self {
        Self { topology }
    }

    /// Role of `unit`. Ids outside the cluster are `Idle`.
    pub const fn role_of(&self, unit: UnitId) -> Role {
        if unit == self.topology.mover {
            Role::DataMover
        } else if unit == self.topology.compute {
            Role::Compute
        } else {
            Role::Idle
        }
    }

    /// Topology the dispatcher classifies.
    pub const fn topology(&self) -> &ClusterTopology {
        &self.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snax_roles() {
        let d = RoleDispatcher::new(ClusterTopology::snax());
        assert_eq!(d.role_of(8), Role::DataMover);
        assert_eq!(d.role_of(0), Role::Compute);
        for unit in 1..8 {
            assert_eq!(d.role_of(unit), Role::Idle);
        }
    }

    #[test]
    fn every_topology_partitions_units() {
        for units in 2..12 {
            for mover in 0..units {
                for compute in (0..units).filter(|&c| c != mover) {
                    let topo = ClusterTopology::new(units, mover, compute).unwrap();
                    let d = RoleDispatcher::new(topo);
                    let roles: Vec<Role> = topo.units().map(|u| d.role_of(u)).collect();
                    assert_eq!(roles.iter().filter(|r| **r == Role::DataMover).count(), 1);
                    assert_eq!(roles.iter().filter(|r| **r == Role::Compute).count(), 1);
                    assert_eq!(
                        roles.iter().filter(|r| **r == Role::Idle).count(),
                        units as usize - 2
                    );
                }
            }
        }
    }

    #[test]
    fn classification_is_stable() {
        let d = RoleDispatcher::new(ClusterTopology::new(4, 3, 1).unwrap());
        let first: Vec<Role> = (0..4).map(|u| d.role_of(u)).collect();
        for _ in 0..10 {
            let again: Vec<Role> = (0..4).map(|u| d.role_of(u)).collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn invalid_topologies_rejected() {
        assert!(ClusterTopology::new(1, 0, 0).is_err());
        assert!(ClusterTopology::new(4, 4, 0).is_err());
        assert!(ClusterTopology::new(4, 2, 2).is_err());
    }

    #[test]
    fn out_of_range_unit_is_idle() {
        let d = RoleDispatcher::new(ClusterTopology::snax());
        assert_eq!(d.role_of(42), Role::Idle);
    }
}

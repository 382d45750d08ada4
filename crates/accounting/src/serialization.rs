//! Stable external representation of a privacy loss distribution.
//!
//! The serialized shape carries exactly the grid spacing, the
//! infinite-loss mass, and the finite masses as a dense run starting at
//! `min_index`. The estimate type is implicitly pessimistic: optimistic
//! distributions refuse to serialize, and deserialized ones are
//! pessimistic by construction.

use pld_accounting_core::{AccountingError, KahanSum, Result};
use serde::{Deserialize, Serialize};

use crate::mechanism::EstimateType;
use crate::pld::PrivacyLossDistribution;
use crate::pmf::GridPmf;

/// Slack allowed on the total probability mass of a serialized PLD.
const MASS_SUM_SLACK: f64 = 1e-9;

/// The serialized shape of a pessimistic privacy loss distribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedPld {
    /// Grid spacing along the privacy-loss axis.
    pub discretization_interval: f64,
    /// Mass with privacy loss `+INFINITY`.
    pub infinity_mass: f64,
    /// Index of the first entry of `masses`.
    pub min_index: i64,
    /// Masses at consecutive indices starting from `min_index`.
    pub masses: Vec<f64>,
}

impl PrivacyLossDistribution {
    /// Serialize into the stable external shape.
    ///
    /// Only pessimistic distributions can be serialized.
    pub fn serialize(&self) -> Result<SerializedPld> {
        if !self.estimate_type.is_pessimistic() {
            return Err(AccountingError::unsupported(
                "only pessimistic distributions serialize",
            ));
        }
        let (min_index, masses) = self.pmf.to_dense().unwrap_or((0, Vec::new()));
        Ok(SerializedPld {
            discretization_interval: self.discretization_interval,
            infinity_mass: self.infinity_mass,
            min_index,
            masses,
        })
    }

    /// Rebuild a distribution from its serialized shape, validating the
    /// mass invariants.
    pub fn deserialize(serialized: &SerializedPld) -> Result<Self> {
        if !serialized.discretization_interval.is_finite()
            || serialized.discretization_interval <= 0.0
        {
            return Err(AccountingError::deserialization(
                "discretization interval must be positive and finite",
            ));
        }
        if !serialized.infinity_mass.is_finite()
            || !(0.0..=1.0).contains(&serialized.infinity_mass)
        {
            return Err(AccountingError::deserialization(
                "infinity mass must lie in [0, 1]",
            ));
        }
        if serialized
            .min_index
            .checked_add(serialized.masses.len() as i64)
            .is_none()
        {
            return Err(AccountingError::deserialization(
                "mass run exceeds the index range",
            ));
        }

        let mut total = KahanSum::new();
        total.add(serialized.infinity_mass);
        for &mass in &serialized.masses {
            if !mass.is_finite() || mass < 0.0 {
                return Err(AccountingError::deserialization(
                    "masses must be finite and non-negative",
                ));
            }
            total.add(mass);
        }
        if total.total() > 1.0 + MASS_SUM_SLACK {
            return Err(AccountingError::deserialization("total mass exceeds one"));
        }

        Ok(Self {
            discretization_interval: serialized.discretization_interval,
            infinity_mass: serialized.infinity_mass,
            pmf: GridPmf::from_dense(serialized.min_index, &serialized.masses),
            estimate_type: EstimateType::Pessimistic,
        })
    }
}

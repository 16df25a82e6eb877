use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GenError, Result};

/// Largest enumeration a domain constant may carry.
pub const ENUM_MAX_LEN: usize = 32;

/// Legal values of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Interval { min: i64, max: i64 },
    Enum(Vec<i64>),
    Int { bits: u8, signed: bool },
}

impl Domain {
    /// Enumeration over `values`, canonicalized as a sorted member set.
    pub fn enumeration(values: impl IntoIterator<Item = i64>) -> Result<Domain> {
        Domain::Enum(values.into_iter().collect()).canonical()
    }

    /// Structural form used as the registry key: enum members are sorted and
    /// deduplicated, interval bounds ordered, integer widths limited to the
    /// C fixed-width types.
    pub fn canonical(self) -> Result<Domain> {
        match self {
            Domain::Enum(mut values) => {
                values.sort_unstable();
                values.dedup();
                if values.len() > ENUM_MAX_LEN {
                    return Err(GenError::DomainTooLarge { len: values.len(), max: ENUM_MAX_LEN });
                }
                Ok(Domain::Enum(values))
            }
            Domain::Interval { min, max } if min > max => Ok(Domain::Interval { min: max, max: min }),
            Domain::Int { bits, .. } if !matches!(bits, 8 | 16 | 32 | 64) => {
                Err(GenError::unhandled("integer domain width", bits))
            }
            d => Ok(d),
        }
    }

    /// Number of members; `None` when it does not fit in a `u64`.
    pub fn len(&self) -> Option<u64> {
        match self {
            Domain::Interval { min, max } => Some(max.abs_diff(*min) + 1),
            Domain::Enum(values) => Some(values.len() as u64),
            Domain::Int { bits, .. } if *bits < 64 => Some(1u64 << bits),
            Domain::Int { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainId(pub usize);

/// Append-only set of domains keyed by structural equality. Registration
/// order is emission order.
#[derive(Debug, Default, Clone)]
pub struct DomainRegistry {
    domains: Vec<Domain>,
    index: HashMap<Domain, DomainId>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, domain: Domain) -> Result<DomainId> {
        let domain = domain.canonical()?;
        if let Some(&id) = self.index.get(&domain) {
            return Ok(id);
        }
        let id = DomainId(self.domains.len());
        self.domains.push(domain.clone());
        self.index.insert(domain, id);
        Ok(id)
    }

    pub fn get(&self, id: DomainId) -> &Domain {
        &self.domains[id.0]
    }

    pub fn lookup(&self, domain: &Domain) -> Option<DomainId> {
        self.index.get(domain).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DomainId, &Domain)> {
        self.domains.iter().enumerate().map(|(i, d)| (DomainId(i), d))
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

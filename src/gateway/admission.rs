use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Per-source-address admission accounting.
///
/// Counts currently-open connections per address. A slot is taken on
/// admission and returned when the issued [`AdmissionTicket`] drops; an
/// address entry is removed once its count reaches zero, so the map stays
/// bounded by the active connection set.
pub struct AddressAdmission {
    counts: DashMap<IpAddr, usize>,
    max_per_address: usize,
}

impl AddressAdmission {
    pub fn new(max_per_address: usize) -> Self {
        Self {
            counts: DashMap::new(),
            max_per_address,
        }
    }

    /// Admit one connection from `addr`, or reject it when the address is
    /// already at the cap. The check and increment happen under the entry
    /// lock, so concurrent attempts cannot both take the last slot.
    pub fn admit(self: &Arc<Self>, addr: IpAddr) -> Result<AdmissionTicket> {
        let mut entry = self.counts.entry(addr).or_insert(0);
        if *entry >= self.max_per_address {
            return Err(AppError::TooManyConnections { addr });
        }
        *entry += 1;
        drop(entry);

        Ok(AdmissionTicket {
            admission: Arc::clone(self),
            addr,
        })
    }

    fn release(&self, addr: IpAddr) {
        if let Some(mut entry) = self.counts.get_mut(&addr) {
            *entry = entry.saturating_sub(1);
            let empty = *entry == 0;
            drop(entry);
            if empty {
                self.counts.remove_if(&addr, |_, count| *count == 0);
            }
        }
    }

    /// Current count for an address (0 when untracked)
    pub fn count(&self, addr: IpAddr) -> usize {
        self.counts.get(&addr).map(|entry| *entry).unwrap_or(0)
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            tracked_addresses: self.counts.len(),
            max_per_address: self.max_per_address,
        }
    }
}

/// RAII admission slot; dropping it returns the slot for its address
pub struct AdmissionTicket {
    admission: Arc<AddressAdmission>,
    addr: IpAddr,
}

impl AdmissionTicket {
    pub fn addr(&self) -> IpAddr {
        self.addr
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.admission.release(self.addr);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStats {
    pub tracked_addresses: usize,
    pub max_per_address: usize,
}

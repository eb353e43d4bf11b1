//! Zone authority answers.
//!
//! SOA and NS data for the configured zone are synthesized instead of
//! stored: the serial derives from the current UTC date and the timer
//! fields are fixed.

use chrono::{Datelike, Utc};

use crate::wire::SoaData;

/// Secondary refresh interval in seconds.
const SOA_REFRESH: u32 = 3_600;
/// Retry interval after a failed refresh, in seconds.
const SOA_RETRY: u32 = 600;
/// Zone expiry for secondaries, in seconds (14 days).
const SOA_EXPIRE: u32 = 1_209_600;
/// Minimum / negative-answer TTL in seconds.
const SOA_MINIMUM: u32 = 300;

/// Synthesizes authority answers for one zone.
#[derive(Debug, Clone)]
pub struct ZoneAuthority {
    zone: String,
    nameserver: String,
    mailbox: String,
}

impl ZoneAuthority {
    /// Create a zone authority.
    ///
    /// The zone is kept lower-case without a trailing dot for membership
    /// checks; nameserver and mailbox gain a trailing root label for use
    /// in answer RDATA.
    ///
    /// # Arguments
    /// * `zone` - The zone this server answers for.
    /// * `nameserver` - Primary nameserver name.
    /// * `mailbox` - Zone contact mailbox in DNS name form.
    pub fn new(zone: &str, nameserver: &str, mailbox: &str) -> Self {
        let mut nameserver = nameserver.to_ascii_lowercase();
        if !nameserver.ends_with('.') {
            nameserver.push('.');
        }
        let mut mailbox = mailbox.to_ascii_lowercase();
        if !mailbox.ends_with('.') {
            mailbox.push('.');
        }
        Self {
            zone: zone.trim_end_matches('.').to_ascii_lowercase(),
            nameserver,
            mailbox,
        }
    }

    /// Whether a query name belongs to this zone.
    ///
    /// Membership is containment of the zone string, so the apex and
    /// every name under it match.
    pub fn in_zone(&self, qname: &str) -> bool {
        qname.contains(&self.zone)
    }

    /// The zone serial for the current UTC date, in `YYYYMMDDrr` form
    /// with a fixed revision of 01. Recomputed on every call, so it
    /// changes at most once per day.
    pub fn serial(&self) -> u32 {
        let today = Utc::now().date_naive();
        (today.year() as u32 * 10_000 + today.month() * 100 + today.day()) * 100 + 1
    }

    /// SOA data for a query name inside the zone.
    ///
    /// # Arguments
    /// * `qname` - The normalized query name.
    ///
    /// # Returns
    /// An `Option` containing the SOA data, or `None` when the name is
    /// outside the zone.
    pub fn soa(&self, qname: &str) -> Option<SoaData> {
        if !self.in_zone(qname) {
            return None;
        }
        Some(SoaData {
            mname: self.nameserver.clone(),
            rname: self.mailbox.clone(),
            serial: self.serial(),
            refresh: SOA_REFRESH,
            retry: SOA_RETRY,
            expire: SOA_EXPIRE,
            minimum: SOA_MINIMUM,
        })
    }

    /// The nameserver name for a query inside the zone.
    ///
    /// # Arguments
    /// * `qname` - The normalized query name.
    ///
    /// # Returns
    /// An `Option` containing the nameserver name, or `None` when the
    /// name is outside the zone.
    pub fn ns(&self, qname: &str) -> Option<String> {
        if !self.in_zone(qname) {
            return None;
        }
        Some(self.nameserver.clone())
    }
}

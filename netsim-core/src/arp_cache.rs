//! The per-host IP-to-MAC cache with aging.

use crate::addresses::{IpAddress, MacAddress};
use crate::clock::SimTime;
use crate::config;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Learned from traffic; expires after
    /// [`ITEM_LIFETIME`](config::arp_cache::ITEM_LIFETIME).
    Dynamic,
    /// Configured by hand; never expires.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpCacheEntry {
    pub mac: MacAddress,
    pub created_at: SimTime,
    pub kind: EntryKind,
}

#[derive(Debug, Default)]
pub struct ArpCache {
    entries: FxHashMap<IpAddress, ArpCacheEntry>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dynamic(&mut self, ip: IpAddress, mac: MacAddress, now: SimTime) {
        self.entries.insert(
            ip,
            ArpCacheEntry {
                mac,
                created_at: now,
                kind: EntryKind::Dynamic,
            },
        );
    }

    pub fn add_static(&mut self, ip: IpAddress, mac: MacAddress, now: SimTime) {
        self.entries.insert(
            ip,
            ArpCacheEntry {
                mac,
                created_at: now,
                kind: EntryKind::Static,
            },
        );
    }

    pub fn get(&self, ip: IpAddress) -> Option<&ArpCacheEntry> {
        self.entries.get(&ip)
    }

    /// Drops dynamic entries older than their lifetime. Called once per host
    /// tick.
    pub fn forget_old_items(&mut self, now: SimTime) {
        self.entries.retain(|_, entry| {
            entry.kind == EntryKind::Static
                || now.duration_since(entry.created_at) < config::arp_cache::ITEM_LIFETIME
        });
    }

    /// Clears dynamic entries only. Used when interface addresses change.
    pub fn wipe(&mut self) {
        self.entries.retain(|_, entry| entry.kind == EntryKind::Static);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IpAddress, &ArpCacheEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimDuration;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[test]
    fn dynamic_entries_age_out() {
        let mut cache = ArpCache::new();
        let added_at = SimTime::from_millis(1000);
        cache.add_dynamic(ip("1.1.1.1"), MacAddress::new([1; 6]), added_at);

        let lifetime = config::arp_cache::ITEM_LIFETIME;
        let just_before = added_at + SimDuration::from_millis(lifetime.as_millis() - 1);
        cache.forget_old_items(just_before);
        assert!(cache.get(ip("1.1.1.1")).is_some());

        let just_after = added_at + SimDuration::from_millis(lifetime.as_millis() + 1);
        cache.forget_old_items(just_after);
        assert!(cache.get(ip("1.1.1.1")).is_none());
    }

    #[test]
    fn static_entries_survive_aging_and_wipe() {
        let mut cache = ArpCache::new();
        cache.add_static(ip("1.1.1.1"), MacAddress::new([1; 6]), SimTime::ZERO);
        cache.add_dynamic(ip("1.1.1.2"), MacAddress::new([2; 6]), SimTime::ZERO);

        cache.forget_old_items(SimTime::from_millis(10_000_000));
        assert!(cache.get(ip("1.1.1.1")).is_some());
        assert!(cache.get(ip("1.1.1.2")).is_none());

        cache.add_dynamic(ip("1.1.1.3"), MacAddress::new([3; 6]), SimTime::ZERO);
        cache.wipe();
        assert_eq!(cache.len(), 1);
    }
}

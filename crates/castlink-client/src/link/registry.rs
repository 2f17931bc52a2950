use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use super::channel::Channel;

/// Identity of a logical channel: local endpoint, remote endpoint, namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub local: String,
    pub remote: String,
    pub namespace: String,
}

impl ChannelKey {
    pub fn new(
        local: impl Into<String>,
        remote: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            namespace: namespace.into(),
        }
    }
}

/// Channel registry:
/// - `ChannelKey -> Channel`
/// - `remote endpoint -> {ChannelKey...}` (wildcard fan-out)
///
/// Lookups return clones so no map guard is held while a channel delivers.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelKey, Channel>,
    remote_index: DashMap<String, DashSet<ChannelKey>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            remote_index: DashMap::new(),
        }
    }

    /// Return the channel for `key`, creating it with `make` if absent.
    /// The flag is `true` when this call created it.
    pub fn get_or_insert_with(
        &self,
        key: ChannelKey,
        make: impl FnOnce() -> Channel,
    ) -> (Channel, bool) {
        let (channel, created) = match self.channels.entry(key.clone()) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(v) => {
                let channel = make();
                v.insert(channel.clone());
                (channel, true)
            }
        };

        if created {
            self.remote_index
                .entry(key.remote.clone())
                .or_insert_with(DashSet::new)
                .insert(key);
        }
        (channel, created)
    }

    pub fn get(&self, key: &ChannelKey) -> Option<Channel> {
        self.channels.get(key).map(|r| r.value().clone())
    }

    /// Every channel whose remote endpoint is `remote`, optionally restricted
    /// to one namespace.
    pub fn from_remote(&self, remote: &str, namespace: Option<&str>) -> Vec<Channel> {
        let Some(set) = self.remote_index.get(remote) else { return vec![]; };
        let keys: Vec<ChannelKey> = set
            .iter()
            .filter(|k| namespace.map_or(true, |ns| k.namespace == ns))
            .map(|k| k.key().clone())
            .collect();
        drop(set);

        keys.iter().filter_map(|k| self.get(k)).collect()
    }

    /// Every channel between `local` and `remote`, across namespaces.
    pub fn on_pair(&self, local: &str, remote: &str) -> Vec<Channel> {
        self.from_remote(remote, None)
            .into_iter()
            .filter(|c| c.key().local == local)
            .collect()
    }

    pub fn remove(&self, key: &ChannelKey) -> Option<Channel> {
        if let Some(set) = self.remote_index.get(&key.remote) {
            set.remove(key);
            if set.is_empty() {
                drop(set);
                self.remote_index.remove(&key.remote);
            }
        }
        self.channels.remove(key).map(|(_, c)| c)
    }

    pub fn keys(&self) -> Vec<ChannelKey> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove and return every channel.
    pub fn drain(&self) -> Vec<Channel> {
        self.keys().iter().filter_map(|k| self.remove(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

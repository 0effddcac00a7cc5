//! `HashRouter` — picks a host by hashing a fixed key.
//!
//! Same key, same host list → same host, for as long as the list is
//! unchanged. Not a load balancer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use wirekit_core::config::Host;
use wirekit_core::error::{Error, Result};
use wirekit_core::router::Router;

pub struct HashRouter<K, S = BuildHasherDefault<DefaultHasher>> {
    hosts: Vec<Host>,
    key: K,
    hasher: S,
}

impl<K: Hash> HashRouter<K> {
    pub fn new(hosts: Vec<Host>, key: K) -> Self {
        Self::with_hasher(hosts, key, BuildHasherDefault::default())
    }
}

impl<K: Hash, S: BuildHasher> HashRouter<K, S> {
    pub fn with_hasher(hosts: Vec<Host>, key: K, hasher: S) -> Self {
        Self { hosts, key, hasher }
    }
}

impl<K: Hash, S: BuildHasher> Router for HashRouter<K, S> {
    fn route(&self) -> Result<(String, u16)> {
        if self.hosts.is_empty() {
            return Err(Error::Route("host list is empty".into()));
        }
        let hash = self.hasher.hash_one(&self.key);
        let host = &self.hosts[(hash % self.hosts.len() as u64) as usize];
        Ok((host.ip.clone(), host.port))
    }
}

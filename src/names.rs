//! Author display names
//!
//! Lookups go to an external directory. Two reserved author ids stand for the
//! client and the field team as a whole and never hit the directory.

use crate::integration::FeedbackConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const CLIENT_AUTHOR_ID: &str = "client";
pub const TEAM_AUTHOR_ID: &str = "equipe";

#[async_trait]
pub trait DisplayNameResolver: Send + Sync {
    /// `None` when the directory does not know the id
    async fn resolve(&self, user_id: &str) -> Option<String>;
}

/// Fixed directory, mostly for tests and the demo
#[derive(Debug, Default)]
pub struct MapNameResolver {
    names: HashMap<String, String>,
}

impl MapNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(user_id.into(), name.into());
        self
    }
}

#[async_trait]
impl DisplayNameResolver for MapNameResolver {
    async fn resolve(&self, user_id: &str) -> Option<String> {
        self.names.get(user_id).cloned()
    }
}

/// Wraps a directory with the reserved constants, a cache and a fallback label
pub struct ReservedNameResolver<R> {
    inner: R,
    reserved: BTreeMap<String, String>,
    fallback: String,
    cache: RwLock<HashMap<String, String>>,
}

impl<R: DisplayNameResolver> ReservedNameResolver<R> {
    pub fn new(inner: R, config: &FeedbackConfig) -> Self {
        Self {
            inner,
            reserved: config.reserved_names.clone(),
            fallback: config.unknown_author_label.clone(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Always yields something printable
    pub async fn display_name(&self, user_id: &str) -> String {
        if let Some(name) = self.reserved.get(user_id) {
            return name.clone();
        }
        let cached = self.cache.read().get(user_id).cloned();
        if let Some(name) = cached {
            return name;
        }

        match self.inner.resolve(user_id).await {
            Some(name) => {
                self.cache.write().insert(user_id.to_string(), name.clone());
                name
            }
            None => {
                debug!("No display name for {}, using fallback", user_id);
                self.fallback.clone()
            }
        }
    }
}

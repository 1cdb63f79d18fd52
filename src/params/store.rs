use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::fs;

pub type SubscriptionId = u64;

/// A single value that changed in the store
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterChange {
    pub group: String,
    pub key: String,
    pub value: Value,
}

pub type ParameterCallback = Box<dyn Fn(&ParameterChange) + Send + Sync>;

/// Grouped key/value parameters with change notification.
///
/// Readers take point-in-time snapshots; nothing in the engine holds a
/// reference into the store across a session.
pub trait ParameterStore: Send + Sync {
    fn get(&self, group: &str, key: &str) -> Option<Value>;

    /// Invoke `callback` after every change within `group`
    fn subscribe(&self, group: &str, callback: ParameterCallback) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

struct Subscriber {
    id: SubscriptionId,
    group: String,
    callback: Arc<dyn Fn(&ParameterChange) + Send + Sync>,
}

/// Thread-safe store backed by a JSON document of `{group: {key: value}}`
pub struct InMemoryParameterStore {
    groups: RwLock<BTreeMap<String, Map<String, Value>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build from a JSON object of groups
    pub fn from_json(document: Value) -> Result<Self> {
        let store = Self::new();
        store.replace(document)?;
        Ok(store)
    }

    pub fn set(&self, group: &str, key: &str, value: Value) {
        {
            let mut groups = self.groups.write().unwrap_or_else(|p| p.into_inner());
            groups
                .entry(group.to_string())
                .or_default()
                .insert(key.to_string(), value.clone());
        }
        // notify outside the lock so callbacks may read the store
        self.notify(&ParameterChange {
            group: group.to_string(),
            key: key.to_string(),
            value,
        });
    }

    pub fn remove(&self, group: &str, key: &str) -> Option<Value> {
        let mut groups = self.groups.write().unwrap_or_else(|p| p.into_inner());
        groups.get_mut(group).and_then(|g| g.remove(key))
    }

    /// Whole store as one JSON object
    pub fn snapshot(&self) -> Value {
        let groups = self.groups.read().unwrap_or_else(|p| p.into_inner());
        Value::Object(
            groups
                .iter()
                .map(|(name, values)| (name.clone(), Value::Object(values.clone())))
                .collect(),
        )
    }

    /// Replace all values, notifying subscribers of each key
    pub fn replace(&self, document: Value) -> Result<()> {
        let Value::Object(root) = document else {
            anyhow::bail!("parameter document must be a JSON object of groups");
        };

        let mut parsed = BTreeMap::new();
        for (group, values) in root {
            match values {
                Value::Object(map) => {
                    parsed.insert(group, map);
                }
                _ => anyhow::bail!("parameter group '{}' must be a JSON object", group),
            }
        }

        let changes: Vec<ParameterChange> = parsed
            .iter()
            .flat_map(|(group, values)| {
                values.iter().map(move |(key, value)| ParameterChange {
                    group: group.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect();

        *self.groups.write().unwrap_or_else(|p| p.into_inner()) = parsed;
        for change in &changes {
            self.notify(change);
        }
        Ok(())
    }

    pub async fn load_json(&self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
        let document: Value =
            serde_json::from_str(&content).context("Failed to parse parameter JSON")?;
        self.replace(document)
    }

    pub async fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .context("Failed to write temporary parameter file")?;
        fs::rename(&temp_path, path)
            .await
            .context("Failed to atomically update parameter file")?;
        Ok(())
    }

    fn notify(&self, change: &ParameterChange) {
        let callbacks: Vec<_> = {
            let subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
            subscribers
                .iter()
                .filter(|s| s.group == change.group)
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in callbacks {
            callback(change);
        }
    }
}

impl Default for InMemoryParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore for InMemoryParameterStore {
    fn get(&self, group: &str, key: &str) -> Option<Value> {
        let groups = self.groups.read().unwrap_or_else(|p| p.into_inner());
        groups.get(group).and_then(|g| g.get(key)).cloned()
    }

    fn subscribe(&self, group: &str, callback: ParameterCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Subscriber {
                id,
                group: group.to_string(),
                callback: Arc::from(callback),
            });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_subscribers_see_only_their_group() {
        let store = InMemoryParameterStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(
            "acquisition",
            Box::new(move |change: &ParameterChange| sink.lock().unwrap().push(change.key.clone())),
        );

        store.set("acquisition", "cycles", json!(10));
        store.set("camera", "fps", json!(30.0));
        store.unsubscribe(id);
        store.set("acquisition", "baseline_sec", json!(5.0));

        assert_eq!(*seen.lock().unwrap(), vec!["cycles".to_string()]);
    }

    #[test]
    fn test_rejects_non_object_groups() {
        assert!(InMemoryParameterStore::from_json(json!({"camera": 3})).is_err());
        assert!(InMemoryParameterStore::from_json(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");

        let store = InMemoryParameterStore::from_json(json!({
            "camera": {"fps": 30.0, "timestamp_mode": "strict"}
        }))
        .unwrap();
        store.save_json(&path).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = InMemoryParameterStore::new();
        loaded.load_json(&path).await.unwrap();
        assert_eq!(loaded.get("camera", "fps"), Some(json!(30.0)));
        assert_eq!(loaded.get("camera", "exposure"), None);
    }
}

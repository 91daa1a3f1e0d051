//! In-memory stand-in for the cloudscale.ch API used by tests.
//!
//! It answers like the real service for the subset of behaviour the
//! reconciler relies on: nested `{slug}`/`{uuid}` objects, 404s for unknown
//! resources, server actions and floating IPs keyed by address.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{ApiError, Result};

use super::transport::{ApiTransport, HttpMethod};

/// Collections, nested ones first so prefix matching picks the longest.
const COLLECTIONS: &[&str] = &[
    "load-balancers/pools",
    "load-balancers/listeners",
    "load-balancers",
    "servers",
    "server-groups",
    "volumes",
    "networks",
    "subnets",
    "floating-ips",
    "objects-users",
    "flavors",
];

/// Keys sent as slugs and returned as `{slug}` objects.
const SLUG_KEYS: &[&str] = &["zone", "flavor", "image", "region"];

/// Keys sent as UUIDs and returned as `{uuid}` objects.
const UUID_KEYS: &[&str] = &["server", "network", "load_balancer", "pool"];

#[derive(Debug, Default)]
struct FakeState {
    collections: BTreeMap<String, Vec<Map<String, Value>>>,
    calls: Vec<(HttpMethod, String)>,
    counter: u32,
    hide_reads: u32,
    hidden: BTreeMap<String, u32>,
    failures: Vec<(HttpMethod, String)>,
}

/// In-memory API.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    /// Creates an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a resource in a collection, as the API would return it.
    pub fn insert(&self, collection: &str, object: Value) {
        let Value::Object(map) = object else {
            panic!("seeded resources must be objects");
        };
        let mut state = self.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(map);
    }

    /// Returns every request made so far.
    pub fn calls(&self) -> Vec<(HttpMethod, String)> {
        self.lock().calls.clone()
    }

    /// Returns the mutating requests made so far.
    pub fn mutations(&self) -> Vec<(HttpMethod, String)> {
        self.calls()
            .into_iter()
            .filter(|(method, _)| method.is_mutating())
            .collect()
    }

    /// Returns the stored resources of a collection.
    pub fn items(&self, collection: &str) -> Vec<Value> {
        self.lock()
            .collections
            .get(collection)
            .map(|items| items.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Makes newly created resources answer 404 for their first `reads` reads.
    pub fn hide_new_resources(&self, reads: u32) {
        self.lock().hide_reads = reads;
    }

    /// Makes the next request with this method and path fail with a 500.
    pub fn fail_next(&self, method: HttpMethod, path: &str) {
        self.lock().failures.push((method, path.to_string()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake cloud lock poisoned")
    }
}

#[async_trait]
impl ApiTransport for FakeCloud {
    async fn request(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value> {
        let mut state = self.lock();
        state.calls.push((method, path.to_string()));

        if let Some(index) = state
            .failures
            .iter()
            .position(|(m, p)| *m == method && p == path)
        {
            state.failures.remove(index);
            return Err(ApiError::request_failed(500, r#"{"detail": "Internal error."}"#).into());
        }

        let path = path.split('?').next().unwrap_or(path);
        let (collection, id, action) = split_path(path).ok_or_else(|| ApiError::NotFound {
            path: path.to_string(),
        })?;

        match (method, id, action) {
            (HttpMethod::Get, None, None) => Ok(Value::Array(
                state
                    .collections
                    .get(collection)
                    .map(|items| items.iter().cloned().map(Value::Object).collect())
                    .unwrap_or_default(),
            )),
            (HttpMethod::Get, Some(id), None) => {
                if let Some(remaining) = state.hidden.get_mut(path)
                    && *remaining > 0
                {
                    *remaining -= 1;
                    return Err(not_found(path));
                }
                state
                    .find(collection, id)
                    .map(|item| Value::Object(item.clone()))
                    .ok_or_else(|| not_found(path))
            }
            (HttpMethod::Post, None, None) => {
                let created = state.create(collection, body.unwrap_or_else(|| json!({})));
                let created_id = object_id(collection, &created).unwrap_or_default();
                let hide_reads = state.hide_reads;
                if hide_reads > 0 {
                    state
                        .hidden
                        .insert(format!("{collection}/{created_id}"), hide_reads);
                }
                Ok(Value::Object(created))
            }
            (HttpMethod::Patch, Some(id), None) => {
                let item = state.find_mut(collection, id).ok_or_else(|| not_found(path))?;
                if let Some(Value::Object(changes)) = body {
                    merge(item, changes);
                }
                Ok(Value::Null)
            }
            (HttpMethod::Delete, Some(id), None) => {
                let items = state.collections.entry(collection.to_string()).or_default();
                let before = items.len();
                items.retain(|item| object_id(collection, item).as_deref() != Some(id));
                if items.len() == before {
                    return Err(not_found(path));
                }
                Ok(Value::Null)
            }
            (HttpMethod::Post, Some(id), Some(action)) => {
                let item = state.find_mut(collection, id).ok_or_else(|| not_found(path))?;
                match action {
                    "start" => {
                        item.insert(String::from("status"), json!("running"));
                    }
                    "stop" => {
                        item.insert(String::from("status"), json!("stopped"));
                    }
                    "scale" => {
                        if let Some(flavor) = body.as_ref().and_then(|b| b.get("flavor")) {
                            item.insert(String::from("flavor"), json!({"slug": flavor}));
                        }
                    }
                    _ => return Err(not_found(path)),
                }
                Ok(Value::Null)
            }
            _ => Err(ApiError::request_failed(405, "Method not allowed.").into()),
        }
    }
}

impl FakeState {
    fn find(&self, collection: &str, id: &str) -> Option<&Map<String, Value>> {
        self.collections
            .get(collection)?
            .iter()
            .find(|item| object_id(collection, item).as_deref() == Some(id))
    }

    fn find_mut(&mut self, collection: &str, id: &str) -> Option<&mut Map<String, Value>> {
        self.collections
            .get_mut(collection)?
            .iter_mut()
            .find(|item| object_id(collection, item).as_deref() == Some(id))
    }

    fn create(&mut self, collection: &str, body: Value) -> Map<String, Value> {
        self.counter += 1;
        let counter = self.counter;
        let mut item = Map::new();
        item.insert(String::from("tags"), json!({}));

        match collection {
            "floating-ips" => {
                let network = if body.get("ip_version") == Some(&json!(6)) {
                    format!("2001:db8::{counter:x}/128")
                } else {
                    format!("192.0.2.{counter}/32")
                };
                item.insert(String::from("network"), json!(network));
                item.insert(String::from("server"), Value::Null);
            }
            "objects-users" => {
                item.insert(String::from("id"), json!(format!("user{counter}")));
                item.insert(
                    String::from("keys"),
                    json!([{"access_key": format!("AK{counter}"), "secret_key": format!("SK{counter}")}]),
                );
            }
            _ => {
                item.insert(
                    String::from("uuid"),
                    json!(format!("00000000-0000-4000-8000-{counter:012}")),
                );
            }
        }
        if collection == "servers" {
            item.insert(String::from("status"), json!("running"));
        }

        if let Value::Object(fields) = body {
            merge(&mut item, fields);
        }

        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(item.clone());
        item
    }
}

/// Applies a request body the way the provider stores it.
fn merge(item: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        if matches!(key.as_str(), "password" | "ssh_keys" | "user_data") {
            continue;
        }

        let value = if key == "server_uuids" || key == "server_groups" {
            let ids = value.as_array().cloned().unwrap_or_default();
            Value::Array(ids.into_iter().map(|id| json!({"uuid": id})).collect())
        } else if SLUG_KEYS.contains(&key.as_str()) && value.is_string() {
            json!({"slug": value})
        } else if UUID_KEYS.contains(&key.as_str()) && value.is_string() {
            json!({"uuid": value})
        } else {
            value
        };

        let key = if key == "server_uuids" {
            String::from("servers")
        } else {
            key
        };
        item.insert(key, value);
    }
}

fn split_path(path: &str) -> Option<(&'static str, Option<&str>, Option<&str>)> {
    let path = path.trim_matches('/');
    COLLECTIONS.iter().find_map(|collection| {
        if path == *collection {
            return Some((*collection, None, None));
        }
        let rest = path.strip_prefix(collection)?.strip_prefix('/')?;
        let mut parts = rest.splitn(2, '/');
        let id = parts.next().filter(|id| !id.is_empty())?;
        Some((*collection, Some(id), parts.next()))
    })
}

fn object_id(collection: &str, item: &Map<String, Value>) -> Option<String> {
    match collection {
        "floating-ips" => item
            .get("network")
            .and_then(Value::as_str)
            .and_then(|network| network.split('/').next())
            .map(String::from),
        "objects-users" => item.get("id").and_then(Value::as_str).map(String::from),
        _ => item.get("uuid").and_then(Value::as_str).map(String::from),
    }
}

fn not_found(path: &str) -> crate::error::CloudscaleError {
    ApiError::NotFound {
        path: path.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("servers"), Some(("servers", None, None)));
        assert_eq!(
            split_path("servers/abc/stop"),
            Some(("servers", Some("abc"), Some("stop")))
        );
        assert_eq!(
            split_path("load-balancers/pools/p1"),
            Some(("load-balancers/pools", Some("p1"), None))
        );
        assert_eq!(split_path("unknown"), None);
    }

    #[tokio::test]
    async fn test_create_then_read_back() {
        let cloud = FakeCloud::new();
        let created = cloud
            .request(
                HttpMethod::Post,
                "volumes",
                Some(json!({"name": "data", "zone": "lpg1", "server_uuids": ["s1"]})),
            )
            .await
            .expect("create");

        let uuid = created["uuid"].as_str().expect("uuid").to_string();
        let fetched = cloud
            .request(HttpMethod::Get, &format!("volumes/{uuid}"), None)
            .await
            .expect("get");

        assert_eq!(fetched["zone"], json!({"slug": "lpg1"}));
        assert_eq!(fetched["servers"], json!([{"uuid": "s1"}]));
        assert_eq!(cloud.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_hidden_and_failing_requests() {
        let cloud = FakeCloud::new();
        cloud.hide_new_resources(1);
        let created = cloud
            .request(HttpMethod::Post, "networks", Some(json!({"name": "private"})))
            .await
            .expect("create");
        let path = format!("networks/{}", created["uuid"].as_str().expect("uuid"));

        let err = cloud
            .request(HttpMethod::Get, &path, None)
            .await
            .expect_err("hidden");
        assert!(err.is_not_found());
        assert!(cloud.request(HttpMethod::Get, &path, None).await.is_ok());

        cloud.fail_next(HttpMethod::Delete, &path);
        assert!(cloud.request(HttpMethod::Delete, &path, None).await.is_err());
        assert!(cloud.request(HttpMethod::Delete, &path, None).await.is_ok());
    }
}

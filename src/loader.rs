//! Dataset resolution, fetching and memoization.
//!
//! The [`DatasetLoader`] turns a field's data source into a shared future of
//! its canonical [`Dataset`]. Two caches sit behind it:
//!
//! - raw payloads per URL, so fields sharing a URL issue one request even
//!   when their mapping differs;
//! - canonical datasets per (source, list path, mapping profile), so fields
//!   with the default mapping share one `Rc<Dataset>`.
//!
//! Network access goes through the [`Transport`] trait: a JSON GET for
//! ordinary URLs, a script tag with a named callback for hosts that only
//! serve cross-origin data that way.

use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, LocalBoxFuture, Shared};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::LoadError;
use crate::item::{Dataset, default_map, extract_list};
use crate::options::{CacheMode, FetchOptions, FieldConfig};

/// Fetches raw payloads. Implemented by the browser binding and by tests.
#[async_trait(?Send)]
pub trait Transport {
    /// Plain JSON GET.
    async fn get_json(&self, url: &Url, cache: CacheMode) -> Result<Value, LoadError>;

    /// Inject a script for `url` (which already carries the `callback` query
    /// parameter) and resolve with the payload passed to the global function
    /// `callback`. Rejects when the script fails to load.
    async fn load_script(&self, url: &Url, callback: &str) -> Result<Value, LoadError>;
}

/// Transport for pages that only use inline data. Every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait(?Send)]
impl Transport for Offline {
    async fn get_json(&self, url: &Url, _cache: CacheMode) -> Result<Value, LoadError> {
        Err(LoadError::Network {
            url: url.to_string(),
            message: "offline".to_owned(),
        })
    }

    async fn load_script(&self, url: &Url, _callback: &str) -> Result<Value, LoadError> {
        Err(LoadError::Script {
            url: url.to_string(),
        })
    }
}

/// Shared future of one raw payload.
pub type RawFuture = Shared<LocalBoxFuture<'static, Result<Rc<Value>, LoadError>>>;

/// Shared future of one canonical dataset.
pub type DatasetFuture = Shared<LocalBoxFuture<'static, Result<Rc<Dataset>, LoadError>>>;

/// Identity of a data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// A remote URL, as configured.
    Url(String),
    /// An inline array, by identity.
    Inline(usize),
    /// No source configured; loads as an empty dataset.
    None,
}

impl SourceKey {
    /// The source key of a field.
    pub fn of(field: &FieldConfig) -> Self {
        match (&field.data, &field.data_url) {
            (Some(data), _) => SourceKey::Inline(data.identity()),
            (None, Some(url)) => SourceKey::Url(url.trim().to_owned()),
            (None, None) => SourceKey::None,
        }
    }
}

/// Which mapping produced a canonical dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Profile {
    /// Default `{id, label}` mapping, no filter.
    Default,
    /// Custom hooks of the field with this key.
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DatasetKey {
    source: SourceKey,
    list_path: Option<String>,
    profile: Profile,
}

/// Whether `url` must be loaded through a script tag.
///
/// # Examples
///
/// ```
/// use autofield::loader::is_script_host;
/// use url::Url;
///
/// let hosts = vec!["script.google.com".to_owned()];
/// let exec = Url::parse("https://script.google.com/macros/s/abc/exec").unwrap();
/// let plain = Url::parse("https://example.com/data.json").unwrap();
/// assert!(is_script_host(&exec, &hosts));
/// assert!(!is_script_host(&plain, &hosts));
/// ```
pub fn is_script_host(url: &Url, hosts: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    hosts.iter().any(|pattern| {
        host == pattern
            || host
                .strip_suffix(pattern.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Resolves and memoizes datasets for one enhancer.
pub struct DatasetLoader {
    transport: Rc<dyn Transport>,
    fetch: FetchOptions,
    raw: HashMap<String, RawFuture>,
    datasets: HashMap<DatasetKey, DatasetFuture>,
    next_callback: u64,
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("fetch", &self.fetch)
            .field("raw", &self.raw.len())
            .field("datasets", &self.datasets.len())
            .finish()
    }
}

impl DatasetLoader {
    /// A loader with empty caches.
    pub fn new(transport: Rc<dyn Transport>, fetch: FetchOptions) -> Self {
        Self {
            transport,
            fetch,
            raw: HashMap::new(),
            datasets: HashMap::new(),
            next_callback: 0,
        }
    }

    /// The dataset of `field`, memoized. `field_key` names the mapping
    /// profile when the field has custom hooks.
    pub fn load(&mut self, field: &FieldConfig, field_key: &str) -> DatasetFuture {
        let has_hooks = field.map_item.is_some() || field.filter_item.is_some();
        let key = DatasetKey {
            source: SourceKey::of(field),
            list_path: field.list_path.clone(),
            profile: if has_hooks {
                Profile::Field(field_key.to_owned())
            } else {
                Profile::Default
            },
        };
        if let Some(existing) = self.datasets.get(&key) {
            debug!(field = field_key, source = ?key.source, "dataset cache hit");
            return existing.clone();
        }

        let map = field.map_item.clone();
        let filter = field.filter_item.clone();
        let build = move |records: &[Value]| {
            let map_fn = |record: &Value| match &map {
                Some(hook) => (hook.get())(record),
                None => default_map(record),
            };
            let filter_fn = filter.as_ref().map(|hook| hook.get());
            Rc::new(Dataset::from_records(records, &map_fn, filter_fn))
        };

        let fut: DatasetFuture = match (&field.data, &field.data_url) {
            (Some(data), _) => {
                let dataset = build(data.records());
                future::ready(Ok(dataset)).boxed_local().shared()
            }
            (None, Some(url)) => {
                let raw = self.raw(url.trim());
                let path = field.list_path.clone();
                async move {
                    let raw = raw.await?;
                    let list = extract_list(&raw, path.as_deref());
                    Ok::<_, LoadError>(build(list))
                }
                .boxed_local()
                .shared()
            }
            (None, None) => future::ready(Ok(build(&[]))).boxed_local().shared(),
        };
        self.datasets.insert(key, fut.clone());
        fut
    }

    /// The raw payload at `url`, memoized.
    pub fn raw(&mut self, url: &str) -> RawFuture {
        if let Some(existing) = self.raw.get(url) {
            debug!(url, "payload cache hit");
            return existing.clone();
        }
        let fut: RawFuture = match Url::parse(url) {
            Ok(parsed) => self.request(parsed),
            Err(err) => future::ready(Err(LoadError::InvalidUrl {
                url: url.to_owned(),
                message: err.to_string(),
            }))
            .boxed_local()
            .shared(),
        };
        self.raw.insert(url.to_owned(), fut.clone());
        fut
    }

    fn request(&mut self, mut url: Url) -> RawFuture {
        let transport = Rc::clone(&self.transport);
        if is_script_host(&url, &self.fetch.script_hosts) {
            let callback = self.callback_name();
            url.query_pairs_mut().append_pair("callback", &callback);
            debug!(url = %url, callback = %callback, "loading dataset by script");
            async move {
                transport
                    .load_script(&url, &callback)
                    .await
                    .map(Rc::new)
            }
            .boxed_local()
            .shared()
        } else {
            let cache = self.fetch.cache;
            debug!(url = %url, ?cache, "fetching dataset");
            async move { transport.get_json(&url, cache).await.map(Rc::new) }
                .boxed_local()
                .shared()
        }
    }

    fn callback_name(&mut self) -> String {
        self.next_callback += 1;
        format!("__ssacCb_{}", self.next_callback)
    }

    /// Number of distinct URLs requested so far.
    pub fn requested_urls(&self) -> usize {
        self.raw.len()
    }

    /// Drop both caches.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.datasets.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::channel::oneshot;
    use serde_json::json;

    use super::*;
    use crate::item::CanonicalItem;

    /// Records every request and answers from a fixed payload.
    #[derive(Default)]
    struct Recording {
        gets: RefCell<Vec<String>>,
        scripts: RefCell<Vec<(String, String)>>,
        payload: Value,
        fail_status: Option<u16>,
    }

    #[async_trait(?Send)]
    impl Transport for Recording {
        async fn get_json(&self, url: &Url, _cache: CacheMode) -> Result<Value, LoadError> {
            self.gets.borrow_mut().push(url.to_string());
            match self.fail_status {
                Some(status) => Err(LoadError::Status {
                    url: url.to_string(),
                    status,
                }),
                None => Ok(self.payload.clone()),
            }
        }

        async fn load_script(&self, url: &Url, callback: &str) -> Result<Value, LoadError> {
            self.scripts
                .borrow_mut()
                .push((url.to_string(), callback.to_owned()));
            Ok(self.payload.clone())
        }
    }

    fn recording(payload: Value) -> Rc<Recording> {
        Rc::new(Recording {
            payload,
            ..Default::default()
        })
    }

    fn loader(transport: Rc<Recording>) -> DatasetLoader {
        DatasetLoader::new(transport, FetchOptions::default())
    }

    fn schools() -> Value {
        json!({"data": {"schools": [
            {"id": 1, "label": "Oak School"},
            {"id": 2, "label": "Pine School"},
            {"id": 3, "label": ""}
        ]}})
    }

    #[tokio::test]
    async fn shared_url_is_requested_once() {
        let transport = recording(schools());
        let mut loader = loader(Rc::clone(&transport));
        let a = FieldConfig::by_label("A")
            .data_url("https://example.com/s.json")
            .list_path("data.schools");
        let b = FieldConfig::by_label("B")
            .data_url("https://example.com/s.json")
            .list_path("data.schools");

        let (da, db) = futures::join!(loader.load(&a, "A"), loader.load(&b, "B"));
        let (da, db) = (da.unwrap(), db.unwrap());
        assert_eq!(transport.gets.borrow().len(), 1);
        assert!(Rc::ptr_eq(&da, &db));
        assert_eq!(da.len(), 2);
    }

    #[tokio::test]
    async fn custom_mapping_gets_its_own_dataset_but_not_its_own_request() {
        let transport = recording(schools());
        let mut loader = loader(Rc::clone(&transport));
        let plain = FieldConfig::by_label("A")
            .data_url("https://example.com/s.json")
            .list_path("data.schools");
        let upper = plain
            .clone()
            .map_item(|r| {
                let label = r.get("label")?.as_str()?.to_uppercase();
                Some(CanonicalItem::new("x", label, r.clone()))
            });

        let a = loader.load(&plain, "A").await.unwrap();
        let b = loader.load(&upper, "B").await.unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(b.items()[0].label, "OAK SCHOOL");
        assert_eq!(transport.gets.borrow().len(), 1);
    }

    #[tokio::test]
    async fn filter_runs_after_blank_labels_are_dropped() {
        let mut loader = loader(recording(Value::Null));
        let field = FieldConfig::by_label("A")
            .data(vec![
                json!({"id": 1, "label": "Oak"}),
                json!({"id": 2, "label": "Pine"}),
            ])
            .filter_item(|item| item.id != "1");
        let ds = loader.load(&field, "A").await.unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.items()[0].label, "Pine");
    }

    #[tokio::test]
    async fn inline_sources_share_by_identity() {
        let mut loader = loader(recording(Value::Null));
        let a = FieldConfig::by_label("A").data(vec![json!({"id": 1, "label": "Oak"})]);
        let b = FieldConfig::by_label("B").data(a.data.clone().unwrap());
        let c = FieldConfig::by_label("C").data(vec![json!({"id": 1, "label": "Oak"})]);

        let da = loader.load(&a, "A").await.unwrap();
        let db = loader.load(&b, "B").await.unwrap();
        let dc = loader.load(&c, "C").await.unwrap();
        assert!(Rc::ptr_eq(&da, &db));
        assert!(!Rc::ptr_eq(&da, &dc));
    }

    #[tokio::test]
    async fn missing_source_is_empty() {
        let mut loader = loader(recording(Value::Null));
        let ds = loader.load(&FieldConfig::by_label("A"), "A").await.unwrap();
        assert!(ds.is_empty());
    }

    #[tokio::test]
    async fn script_hosts_use_named_callbacks() {
        let transport = recording(json!([{"id": 1, "label": "Oak"}]));
        let mut loader = loader(Rc::clone(&transport));
        let a = FieldConfig::by_label("A").data_url("https://script.google.com/macros/s/x/exec");
        let b = FieldConfig::by_label("B")
            .data_url("https://script.googleusercontent.com/macros/echo?user=1");

        loader.load(&a, "A").await.unwrap();
        loader.load(&b, "B").await.unwrap();

        let scripts = transport.scripts.borrow();
        assert_eq!(scripts.len(), 2);
        assert!(transport.gets.borrow().is_empty());
        assert_eq!(scripts[0].1, "__ssacCb_1");
        assert!(scripts[0].0.ends_with("exec?callback=__ssacCb_1"));
        assert_eq!(scripts[1].1, "__ssacCb_2");
        assert!(scripts[1].0.contains("user=1&callback=__ssacCb_2"));
    }

    #[tokio::test]
    async fn failures_are_shared_and_not_retried() {
        let transport = Rc::new(Recording {
            fail_status: Some(503),
            ..Default::default()
        });
        let mut loader = loader(Rc::clone(&transport));
        let field = FieldConfig::by_label("A").data_url("https://example.com/s.json");

        let first = loader.load(&field, "A").await;
        let second = loader.load(&field, "A").await;
        assert!(matches!(first, Err(LoadError::Status { status: 503, .. })));
        assert_eq!(first, second);
        assert_eq!(transport.gets.borrow().len(), 1);
    }

    #[tokio::test]
    async fn invalid_url_fails_without_a_request() {
        let transport = recording(Value::Null);
        let mut loader = loader(Rc::clone(&transport));
        let field = FieldConfig::by_label("A").data_url("not a url");
        let result = loader.load(&field, "A").await;
        assert!(matches!(result, Err(LoadError::InvalidUrl { .. })));
        assert!(transport.gets.borrow().is_empty());
    }

    /// Resolves each GET from a channel the test completes later.
    struct Deferred {
        pending: RefCell<Option<oneshot::Receiver<Value>>>,
    }

    #[async_trait(?Send)]
    impl Transport for Deferred {
        async fn get_json(&self, url: &Url, _cache: CacheMode) -> Result<Value, LoadError> {
            let rx = self.pending.borrow_mut().take();
            match rx {
                Some(rx) => rx.await.map_err(|_| LoadError::Network {
                    url: url.to_string(),
                    message: "cancelled".into(),
                }),
                None => Err(LoadError::Network {
                    url: url.to_string(),
                    message: "second request".into(),
                }),
            }
        }

        async fn load_script(&self, url: &Url, _callback: &str) -> Result<Value, LoadError> {
            Err(LoadError::Script { url: url.to_string() })
        }
    }

    #[tokio::test]
    async fn pending_load_completes_for_every_waiter() {
        let (tx, rx) = oneshot::channel();
        let transport = Rc::new(Deferred {
            pending: RefCell::new(Some(rx)),
        });
        let mut loader = DatasetLoader::new(transport, FetchOptions::default());
        let field = FieldConfig::by_label("A").data_url("https://example.com/s.json");

        let first = loader.load(&field, "A");
        let second = loader.load(&field, "A");
        assert!(first.clone().now_or_never().is_none());

        tx.send(json!([{"id": 1, "label": "Oak"}])).unwrap();
        let (a, b) = futures::join!(first, second);
        assert!(Rc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[test]
    fn script_host_matches_subdomains_only() {
        let hosts = vec!["script.google.com".to_owned()];
        let url = |s: &str| Url::parse(s).unwrap();
        assert!(is_script_host(&url("https://a.script.google.com/x"), &hosts));
        assert!(!is_script_host(&url("https://notscript.google.com/x"), &hosts));
        assert!(!is_script_host(&url("https://script.google.com.evil.io/x"), &hosts));
    }
}

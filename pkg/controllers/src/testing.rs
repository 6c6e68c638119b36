//! In-memory collaborators for engine and scheduler tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use pkg_providers::Provider;
use pkg_types::{EndpointConfig, EndpointMap, Target};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::source::{FqdnRegistrar, MetadataSource};

pub fn endpoint(name: &str, pool: &str, targets: &[(&str, &str)]) -> EndpointConfig {
    EndpointConfig {
        endpoint: name.to_string(),
        target_pool_name: pool.to_string(),
        target_port: "80".to_string(),
        targets: targets.iter().map(|(ip, p)| Target::new(*ip, *p)).collect(),
        ..Default::default()
    }
}

/// Pool name owned by scope `env1` / `suffix`.
pub fn owned_pool(service: &str) -> String {
    format!("{}_stack_env1_suffix", service)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(EndpointConfig),
    Update(EndpointConfig),
    Remove(EndpointConfig),
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::Add(_) => "add",
            Call::Update(_) => "update",
            Call::Remove(_) => "remove",
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        match self {
            Call::Add(c) | Call::Update(c) | Call::Remove(c) => c,
        }
    }
}

/// Provider whose state mirrors every successful mutation.
#[derive(Default)]
pub struct FakeProvider {
    entries: Mutex<Vec<EndpointConfig>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    fqdns: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per endpoint.
    pub fn with_state(entries: Vec<EndpointConfig>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .filter(|e| seen.insert(e.endpoint.clone()))
            .collect();
        Self::with_entries(entries)
    }

    /// Entries exactly as given, duplicates included.
    pub fn with_entries(entries: Vec<EndpointConfig>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, endpoint: &str) {
        self.failing.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fqdn(&self, endpoint: &str, fqdn: &str) {
        self.fqdns
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), fqdn.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) -> Result<()> {
        let endpoint = call.config().endpoint.clone();
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(&endpoint) {
            return Err(anyhow!("injected failure for {}", endpoint));
        }
        Ok(())
    }

    fn fqdn(&self, endpoint: &str) -> Option<String> {
        self.fqdns.lock().unwrap().get(endpoint).cloned()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("fake provider unreachable"));
        }
        Ok(())
    }

    async fn get_lb_configs(&self) -> Result<Vec<EndpointConfig>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("fake provider unreachable"));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn add_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.record(Call::Add(config.clone()))?;
        let mut entries = self.entries.lock().unwrap();
        let existing = entries.iter_mut().find(|e| {
            e.endpoint == config.endpoint
                && e.target_pool_name
                    .eq_ignore_ascii_case(&config.target_pool_name)
        });
        match existing {
            Some(e) => {
                for t in &config.targets {
                    if !e.targets.contains(t) {
                        e.targets.push(t.clone());
                    }
                }
            }
            None => entries.push(config.clone()),
        }
        Ok(self.fqdn(&config.endpoint))
    }

    async fn update_lb_config(&self, config: &EndpointConfig) -> Result<Option<String>> {
        self.record(Call::Update(config.clone()))?;
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.endpoint == config.endpoint) {
            Some(e) => *e = config.clone(),
            None => entries.push(config.clone()),
        }
        Ok(self.fqdn(&config.endpoint))
    }

    async fn remove_lb_config(&self, config: &EndpointConfig) -> Result<()> {
        self.record(Call::Remove(config.clone()))?;
        self.entries.lock().unwrap().retain(|e| {
            !(e.endpoint == config.endpoint
                && e.target_pool_name
                    .eq_ignore_ascii_case(&config.target_pool_name))
        });
        Ok(())
    }
}

pub struct FakeMetadata {
    version: Mutex<String>,
    desired: Mutex<EndpointMap>,
    fail_version: AtomicBool,
    fail_desired: AtomicBool,
    fetches: AtomicUsize,
}

impl FakeMetadata {
    pub fn new(version: &str, desired: Vec<EndpointConfig>) -> Self {
        let fake = Self {
            version: Mutex::new(String::new()),
            desired: Mutex::new(EndpointMap::new()),
            fail_version: AtomicBool::new(false),
            fail_desired: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        };
        fake.set_version(version);
        fake.set_desired(desired);
        fake
    }

    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn set_desired(&self, desired: Vec<EndpointConfig>) {
        *self.desired.lock().unwrap() = desired
            .into_iter()
            .map(|c| (c.endpoint.clone(), c))
            .collect();
    }

    pub fn fail_version(&self, fail: bool) {
        self.fail_version.store(fail, Ordering::SeqCst);
    }

    pub fn fail_desired(&self, fail: bool) {
        self.fail_desired.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    fn environment_uuid(&self) -> &str {
        "env1"
    }

    async fn version(&self) -> Result<String> {
        if self.fail_version.load(Ordering::SeqCst) {
            return Err(anyhow!("metadata unreachable"));
        }
        Ok(self.version.lock().unwrap().clone())
    }

    async fn desired_endpoints(&self, _suffix: &str) -> Result<EndpointMap> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_desired.load(Ordering::SeqCst) {
            return Err(anyhow!("metadata unreachable"));
        }
        Ok(self.desired.lock().unwrap().clone())
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistrar {
    registered: Mutex<Vec<(String, String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeRegistrar {
    pub fn fail_on(&self, fqdn: &str) {
        self.failing.lock().unwrap().insert(fqdn.to_string());
    }

    pub fn registered(&self) -> Vec<(String, String, String)> {
        let mut r = self.registered.lock().unwrap().clone();
        r.sort();
        r
    }
}

#[async_trait]
impl FqdnRegistrar for FakeRegistrar {
    async fn register_fqdn(&self, service: &str, stack: &str, fqdn: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(fqdn) {
            return Err(anyhow!("dns rejected {}", fqdn));
        }
        self.registered.lock().unwrap().push((
            service.to_string(),
            stack.to_string(),
            fqdn.to_string(),
        ));
        Ok(())
    }
}

//! Network reachability signal
//!
//! A [`ConnectivityMonitor`] owns the current online/offline state. A
//! [`NetworkSource`] attached with [`ConnectivityMonitor::initialize`] is the
//! only thing that reports transitions; [`ConnectivityMonitor::shutdown`]
//! detaches it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_common::{ListenerRegistry, SubscriptionId, Topic};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub changed_at: DateTime<Utc>,
}

impl Topic for ConnectivityState {
    fn topic(&self) -> &str {
        if self.is_online {
            "online"
        } else {
            "offline"
        }
    }
}

struct Shared {
    state: watch::Sender<ConnectivityState>,
    listeners: ListenerRegistry<ConnectivityState>,
}

/// Callback handle given to a [`NetworkSource`]
#[derive(Clone)]
pub struct ConnectivityReporter {
    shared: Arc<Shared>,
}

impl ConnectivityReporter {
    /// Record the latest reachability. Returns true on a transition.
    pub fn report(&self, online: bool) -> bool {
        let changed = self.shared.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            state.changed_at = Utc::now();
            true
        });

        if changed {
            let state = *self.shared.state.borrow();
            if online {
                tracing::info!("Network: online");
            } else {
                tracing::warn!("Network: offline");
            }
            self.shared.listeners.emit(&state);
        }
        changed
    }
}

/// Something that observes the network and reports reachability
#[async_trait]
pub trait NetworkSource: Send + Sync + 'static {
    /// Runs until the task is aborted.
    async fn run(&self, reporter: ConnectivityReporter);
}

pub struct ConnectivityMonitor {
    shared: Arc<Shared>,
    source_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Starts online, as a device is assumed reachable until told otherwise.
    pub fn new() -> Self {
        Self::with_initial(true)
    }

    pub fn with_initial(online: bool) -> Self {
        let (state, _) = watch::channel(ConnectivityState {
            is_online: online,
            changed_at: Utc::now(),
        });
        Self {
            shared: Arc::new(Shared {
                state,
                listeners: ListenerRegistry::new(),
            }),
            source_task: Mutex::new(None),
        }
    }

    /// Attach `source`. A second call while one is attached is ignored.
    pub fn initialize(&self, source: Arc<dyn NetworkSource>) -> bool {
        let mut task = self.source_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            tracing::warn!("Connectivity monitor already initialized, ignoring");
            return false;
        }

        let reporter = self.reporter();
        *task = Some(tokio::spawn(async move { source.run(reporter).await }));
        tracing::debug!("Connectivity monitor initialized");
        true
    }

    /// Detach the network source. State keeps its last value.
    pub fn shutdown(&self) {
        let task = self
            .source_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("Connectivity monitor shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.source_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn reporter(&self) -> ConnectivityReporter {
        ConnectivityReporter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.shared.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online
    }

    /// Async view of transitions
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.shared.state.subscribe()
    }

    /// `listener` receives every transition; `true` means online.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .subscribe(depot_common::ANY_TOPIC, move |state: &ConnectivityState| {
                listener(state.is_online)
            })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodically opens a TCP connection to the backend host
pub struct TcpProbe {
    addr: String,
    interval: Duration,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            interval,
            timeout,
        }
    }

    /// Probe the host and port of `url` (scheme default port when absent).
    pub fn for_url(url: &str, interval: Duration, timeout: Duration) -> depot_common::Result<Self> {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            depot_common::DepotError::ConfigError(format!("invalid url '{}': {}", url, e))
        })?;
        let host = parsed.host_str().ok_or_else(|| {
            depot_common::DepotError::ConfigError(format!("url '{}' has no host", url))
        })?;
        let port = parsed.port_or_known_default().unwrap_or(80);
        Ok(Self::new(format!("{}:{}", host, port), interval, timeout))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn probe_once(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl NetworkSource for TcpProbe {
    async fn run(&self, reporter: ConnectivityReporter) {
        loop {
            let online = self.probe_once().await;
            tracing::trace!("Probe {} -> {}", self.addr, online);
            reporter.report(online);
            tokio::time::sleep(self.interval).await;
        }
    }
}

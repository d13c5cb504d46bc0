//! In-process [`KeyServer`] backed by the real registry.
//!
//! Requests go straight to a [`KeyRegistry`] validating against the
//! [`SimWorld`], so clients exercise the same status codes a deployed server
//! would return. Tests can script failures ahead of the registry and read
//! request counters afterwards.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use teambot_core::{
    BoxedKeyEnvelope, KeyRequest, KeyServer, PublishOutcome, ServerStatus, TeambotError,
};
use teambot_server::{KeyRegistry, MemoryStorage, RegistryConfig, RegistryError, Storage};

use crate::SimWorld;

/// A failure to return instead of consulting the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFault {
    /// Answer with this status
    Status(ServerStatus),
    /// Fail as if the network dropped the request
    Transport,
}

impl InjectedFault {
    fn into_error(self) -> TeambotError {
        match self {
            Self::Status(status) => {
                TeambotError::Server { status, message: "injected fault".to_string() }
            },
            Self::Transport => TeambotError::Transport("injected network failure".to_string()),
        }
    }
}

/// Counters for requests that reached the server.
#[derive(Debug, Default)]
struct Counters {
    fetches: AtomicUsize,
    publishes: AtomicUsize,
    deletes: AtomicUsize,
}

/// In-process key server. Clones share registry, faults, and counters.
pub struct SimKeyServer<S: Storage = MemoryStorage> {
    registry: Arc<KeyRegistry<S, SimWorld>>,
    publish_faults: Arc<Mutex<VecDeque<InjectedFault>>>,
    fetch_faults: Arc<Mutex<VecDeque<InjectedFault>>>,
    counters: Arc<Counters>,
}

impl<S: Storage> Clone for SimKeyServer<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            publish_faults: Arc::clone(&self.publish_faults),
            fetch_faults: Arc::clone(&self.fetch_faults),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl SimKeyServer<MemoryStorage> {
    /// Server over in-memory storage with test deletes enabled.
    pub fn new(world: SimWorld) -> Self {
        Self::with_storage(MemoryStorage::new(), world, RegistryConfig { allow_test_delete: true })
    }
}

impl<S: Storage> SimKeyServer<S> {
    /// Server over an explicit storage backend.
    pub fn with_storage(storage: S, world: SimWorld, config: RegistryConfig) -> Self {
        Self {
            registry: Arc::new(KeyRegistry::new(storage, world, config)),
            publish_faults: Arc::new(Mutex::new(VecDeque::new())),
            fetch_faults: Arc::new(Mutex::new(VecDeque::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// The registry behind this server.
    pub fn registry(&self) -> &KeyRegistry<S, SimWorld> {
        &self.registry
    }

    /// Fail the next publishes with `faults`, in order.
    #[allow(clippy::expect_used)]
    pub fn inject_publish_faults(&self, faults: impl IntoIterator<Item = InjectedFault>) {
        self.publish_faults.lock().expect("fault queue mutex poisoned").extend(faults);
    }

    /// Fail the next fetches with `faults`, in order.
    #[allow(clippy::expect_used)]
    pub fn inject_fetch_faults(&self, faults: impl IntoIterator<Item = InjectedFault>) {
        self.fetch_faults.lock().expect("fault queue mutex poisoned").extend(faults);
    }

    /// Fetches received, including ones failed by injection.
    pub fn fetches(&self) -> usize {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    /// Publishes received, including ones failed by injection.
    pub fn publishes(&self) -> usize {
        self.counters.publishes.load(Ordering::SeqCst)
    }

    /// Test deletes received.
    pub fn deletes(&self) -> usize {
        self.counters.deletes.load(Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    fn next_fault(queue: &Mutex<VecDeque<InjectedFault>>) -> Option<InjectedFault> {
        queue.lock().expect("fault queue mutex poisoned").pop_front()
    }
}

/// Registry rejections become server statuses; storage failures look like
/// the server being unreachable.
fn to_client_error(err: RegistryError) -> TeambotError {
    match err {
        RegistryError::Rejected { status, message } => TeambotError::Server { status, message },
        RegistryError::Storage(e) => {
            tracing::warn!(error = %e, "Simulated server storage failure");
            TeambotError::Transport(format!("server storage: {e}"))
        },
    }
}

#[async_trait]
impl<S: Storage> KeyServer for SimKeyServer<S> {
    async fn fetch(&self, request: &KeyRequest) -> Result<Option<BoxedKeyEnvelope>, TeambotError> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = Self::next_fault(&self.fetch_faults) {
            tracing::debug!(
                bot = %format_args!("{:032x}", request.uid),
                ?fault,
                "Injecting fetch fault"
            );
            return Err(fault.into_error());
        }
        tokio::task::yield_now().await;

        self.registry.fetch(request).map_err(to_client_error)
    }

    async fn publish(
        &self,
        request: &KeyRequest,
        envelope: &BoxedKeyEnvelope,
    ) -> Result<PublishOutcome, TeambotError> {
        self.counters.publishes.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = Self::next_fault(&self.publish_faults) {
            tracing::debug!(
                bot = %format_args!("{:032x}", request.uid),
                ?fault,
                "Injecting publish fault"
            );
            return Err(fault.into_error());
        }
        tokio::task::yield_now().await;

        // "Generation exists" stays an error here; the member keyer owns
        // turning it into success.
        self.registry.publish(request, envelope).map_err(to_client_error)?;
        Ok(PublishOutcome::Created)
    }

    async fn delete_for_test(&self, request: &KeyRequest) -> Result<(), TeambotError> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.registry.delete_for_test(request).map_err(to_client_error)
    }
}

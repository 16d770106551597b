//! Asynchronous schema fetches for plugin and database nodes
//!
//! A node whose outputs depend on an external schema (a plugin API, a
//! database table) asks [`SchemaSync`] for it. The fetch runs as a tokio task
//! and its result comes back over a channel as a [`SchemaArrival`]. Each node
//! has at most one fetch in flight: a new request supersedes the previous one
//! and removing the node cancels it. Arrivals for superseded or cancelled
//! requests are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};
use crate::types::{NodeId, VariableMetaDto};

/// What schema a node needs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaRequest {
    PluginApi { plugin_id: String, api_name: String },
    DatabaseTable { table_id: String },
}

/// Source of external schemas, implemented by the host
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch(&self, request: &SchemaRequest) -> Result<Vec<VariableMetaDto>>;
}

/// Result of a fetch, delivered to the session
#[derive(Debug)]
pub struct SchemaArrival {
    pub node_id: NodeId,
    pub generation: u64,
    pub request: SchemaRequest,
    pub result: Result<Vec<VariableMetaDto>>,
}

/// What draining the arrivals did
#[derive(Debug, Default)]
pub struct SchemaSyncOutcome {
    /// Schemas applied to their nodes
    pub applied: usize,
    /// Arrivals that could not be applied, with the reason
    pub failed: Vec<(NodeId, EngineError)>,
}

impl SchemaSyncOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct InFlight {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct SchemaSync {
    fetcher: Arc<dyn SchemaFetcher>,
    sender: mpsc::UnboundedSender<SchemaArrival>,
    receiver: mpsc::UnboundedReceiver<SchemaArrival>,
    in_flight: HashMap<NodeId, InFlight>,
    next_generation: u64,
}

impl SchemaSync {
    pub fn new(fetcher: Arc<dyn SchemaFetcher>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            fetcher,
            sender,
            receiver,
            in_flight: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Start fetching a schema for a node, superseding any fetch in flight for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&mut self, node_id: &str, request: SchemaRequest) -> Result<u64> {
        let runtime = Handle::try_current().map_err(|e| {
            EngineError::Config(format!("schema fetches need a tokio runtime: {}", e))
        })?;

        if self.cancel(node_id) {
            log::debug!("Superseding schema fetch for node '{}'", node_id);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let fetcher = Arc::clone(&self.fetcher);
        let sender = self.sender.clone();
        let owner = node_id.to_string();

        let handle = runtime.spawn(async move {
            let result = fetcher.fetch(&request).await;
            // the receiver only goes away with the session
            let _ = sender.send(SchemaArrival {
                node_id: owner,
                generation,
                request,
                result,
            });
        });

        self.in_flight
            .insert(node_id.to_string(), InFlight { generation, handle });
        Ok(generation)
    }

    /// Cancel the fetch in flight for a node
    pub fn cancel(&mut self, node_id: &str) -> bool {
        match self.in_flight.remove(node_id) {
            Some(in_flight) => {
                in_flight.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, node_id: &str) -> bool {
        self.in_flight.contains_key(node_id)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    fn accept(&mut self, arrival: SchemaArrival) -> Option<SchemaArrival> {
        let current = self
            .in_flight
            .get(&arrival.node_id)
            .is_some_and(|f| f.generation == arrival.generation);
        if !current {
            log::warn!(
                "Ignoring stale schema arrival for node '{}' (generation {})",
                arrival.node_id,
                arrival.generation
            );
            return None;
        }
        self.in_flight.remove(&arrival.node_id);
        Some(arrival)
    }

    /// Next arrival that is already waiting, without blocking
    pub fn try_next(&mut self) -> Option<SchemaArrival> {
        while let Ok(arrival) = self.receiver.try_recv() {
            if let Some(arrival) = self.accept(arrival) {
                return Some(arrival);
            }
        }
        None
    }

    /// Wait for the next current arrival; `None` once nothing is in flight
    pub async fn next(&mut self) -> Option<SchemaArrival> {
        loop {
            if let Some(arrival) = self.try_next() {
                return Some(arrival);
            }
            if self.in_flight.is_empty() {
                return None;
            }
            let arrival = self.receiver.recv().await?;
            if let Some(arrival) = self.accept(arrival) {
                return Some(arrival);
            }
        }
    }
}

impl Drop for SchemaSync {
    fn drop(&mut self) {
        for (_, in_flight) in self.in_flight.drain() {
            in_flight.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DtoType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaFetcher for TableFetcher {
        async fn fetch(&self, request: &SchemaRequest) -> Result<Vec<VariableMetaDto>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request {
                SchemaRequest::DatabaseTable { table_id } if table_id == "missing" => {
                    Err(EngineError::Config("no such table".to_string()))
                }
                _ => Ok(vec![VariableMetaDto {
                    name: "id".to_string(),
                    dto_type: DtoType::Integer,
                    assist_type: None,
                    schema: None,
                    required: false,
                    description: None,
                    read_only: false,
                    default_value: None,
                }]),
            }
        }
    }

    fn sync() -> SchemaSync {
        SchemaSync::new(Arc::new(TableFetcher {
            calls: AtomicUsize::new(0),
        }))
    }

    fn table(id: &str) -> SchemaRequest {
        SchemaRequest::DatabaseTable {
            table_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_arrival_delivered() {
        let mut sync = sync();
        let generation = sync.request("db", table("users")).unwrap();
        assert!(sync.is_pending("db"));

        let arrival = sync.next().await.unwrap();
        assert_eq!(arrival.node_id, "db");
        assert_eq!(arrival.generation, generation);
        assert_eq!(arrival.result.unwrap()[0].name, "id");
        assert!(!sync.is_pending("db"));
        assert!(sync.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_errors_are_delivered() {
        let mut sync = sync();
        sync.request("db", table("missing")).unwrap();
        let arrival = sync.next().await.unwrap();
        assert!(arrival.result.is_err());
    }

    #[tokio::test]
    async fn test_newer_request_supersedes() {
        let mut sync = sync();
        sync.request("db", table("old")).unwrap();
        let latest = sync.request("db", table("new")).unwrap();
        assert_eq!(sync.pending_count(), 1);

        let arrival = sync.next().await.unwrap();
        assert_eq!(arrival.generation, latest);
        assert_eq!(arrival.request, table("new"));
        assert!(sync.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_never_arrives() {
        let mut sync = sync();
        sync.request("db", table("users")).unwrap();
        assert!(sync.cancel("db"));
        assert!(!sync.cancel("db"));
        assert!(sync.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_arrival_ignored() {
        let mut sync = sync();
        sync.sender
            .send(SchemaArrival {
                node_id: "gone".to_string(),
                generation: 7,
                request: table("users"),
                result: Ok(Vec::new()),
            })
            .unwrap();
        assert!(sync.try_next().is_none());
    }

    #[test]
    fn test_request_outside_runtime_fails() {
        let mut sync = sync();
        assert!(matches!(
            sync.request("db", table("users")),
            Err(EngineError::Config(_))
        ));
    }
}

//! Cohort member process entry point: parses [`CohortMemberConfig`], wires C1-C10 together
//! around an in-memory [`Collection`]/[`CohortBus`] pair (this core ships no concrete storage
//! engine or message-bus transport, per its scope), and idles until asked to shut down.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use error_stack::{Result, ResultExt};
use omrs_core::{
    collection::Collection,
    config::CohortMemberConfig,
    error::LogicError,
    event_processor::InstanceEventProcessor,
    federator::EnterpriseFederator,
    logging,
    registry::{ConnectorRegistry, FederationListener},
    rules::TypeNameAllowList,
    test_support::{InMemoryBus, InMemoryCollection},
    validation::{BasicInstanceFactory, BasicInstanceValidator},
    wrapper::{LocalRepositoryConfig, LocalRepositoryWrapper},
    OutboundEventEmitter, OverflowPolicy,
};
use omrs_types::ids::MetadataCollectionId;

/// Registered with the [`ConnectorRegistry`] on the federator's behalf at construction; the
/// federator itself never caches connectors (it re-reads [`ConnectorRegistry::snapshot`] on every
/// call), so this listener exists only to satisfy the "registers itself at construction" contract
/// without introducing a second, redundant cache.
struct NullListener;

#[async_trait]
impl FederationListener for NullListener {
    async fn set_local_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {}

    async fn add_remote_connector(&self, _id: MetadataCollectionId, _connector: Arc<dyn Collection>) {}

    async fn remove_remote_connector(&self, _id: MetadataCollectionId) {}
}

#[tokio::main]
async fn main() -> Result<(), LogicError> {
    let config = CohortMemberConfig::parse();

    logging::init_logger(config.log_format, &config.log_filter)
        .change_context(LogicError)
        .attach_printable("a global tracing subscriber was already installed")?;

    let local_id = config.local_metadata_collection_id();

    let collection = Arc::new(InMemoryCollection::new());
    let bus: Arc<dyn omrs_core::bus::CohortBus> = Arc::new(InMemoryBus::new());
    let emitter = Arc::new(OutboundEventEmitter::spawn(bus, 1024, OverflowPolicy::DropOldest));

    let repository_config = LocalRepositoryConfig {
        local_metadata_collection_id: local_id,
        local_metadata_collection_name: config.local_metadata_collection_name.clone(),
        produce_events_for_real_connector: config.produce_events_for_real_connector,
    };
    let wrapper = Arc::new(LocalRepositoryWrapper::new(
        collection.clone(),
        BasicInstanceValidator,
        BasicInstanceFactory,
        Some(emitter),
        repository_config,
    ));

    let exchange_rule = Arc::new(TypeNameAllowList::new(
        config.save_exchange_rule,
        config.selected_types_to_process.clone(),
    ));
    let _event_processor = InstanceEventProcessor::new(wrapper, exchange_rule);

    let registry = Arc::new(ConnectorRegistry::new());
    // Kept alive for the registry consumer slot it occupies at construction; this binary never
    // reads from it directly, it is the seam a real front door (REST/gRPC) would call into.
    let _federator = EnterpriseFederator::new(registry.clone(), Arc::new(NullListener)).await;
    registry.set_local_connector(local_id, collection).await;

    tracing::info!(
        local_metadata_collection_id = %local_id,
        cohort_names = ?config.cohort_names,
        "cohort member started"
    );

    // Each entry in `cohort_names` would own a real `CohortBus` connection to that cohort's
    // message topic; this core does not implement a transport, so there is nothing to dial here.

    tokio::signal::ctrl_c()
        .await
        .change_context(LogicError)
        .attach_printable("failed to listen for shutdown signal")?;

    registry.shutdown().await;
    tracing::info!("cohort member shut down");

    Ok(())
}

use core::fmt;

#[cfg(feature = "clap")]
use clap::{Parser, ValueEnum};
use omrs_types::MetadataCollectionId;
use uuid::Uuid;

/// Governs how aggressively a repository learns reference copies from the cohort
/// (spec.md §6's `saveExchangeRule`).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
pub enum SaveExchangeRuleMode {
    #[default]
    None,
    JustTypeDefs,
    LearnedTypeDefs,
    DesiredTypeDefs,
    SelectedTypeDefs,
    All,
}

/// The configuration surface for one cohort member (spec.md §6), built with `clap::Parser`
/// following the storage crate's per-field `#[clap(long, env = "...")]` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(Parser))]
pub struct CohortMemberConfig {
    /// Immutable identifier of the local metadata collection.
    #[cfg_attr(feature = "clap", clap(long, env = "OMRS_LOCAL_COLLECTION_ID"))]
    pub local_metadata_collection_id: Uuid,

    /// Display name of the local metadata collection.
    #[cfg_attr(feature = "clap", clap(long, env = "OMRS_LOCAL_COLLECTION_NAME"))]
    pub local_metadata_collection_name: String,

    #[cfg_attr(
        feature = "clap",
        clap(long, env = "OMRS_LOCAL_SERVER_NAME", default_value = "local-server")
    )]
    pub local_server_name: String,

    #[cfg_attr(
        feature = "clap",
        clap(long, env = "OMRS_LOCAL_SERVER_TYPE", default_value = "Repository")
    )]
    pub local_server_type: String,

    #[cfg_attr(
        feature = "clap",
        clap(long, env = "OMRS_LOCAL_ORGANIZATION_NAME", default_value = "")
    )]
    pub local_organization_name: String,

    #[cfg_attr(feature = "clap", clap(long, env = "OMRS_PRODUCE_EVENTS_FOR_REAL_CONNECTOR"))]
    pub produce_events_for_real_connector: bool,

    #[cfg_attr(
        feature = "clap",
        clap(long, value_enum, default_value = "just-type-defs", env = "OMRS_SAVE_EXCHANGE_RULE")
    )]
    pub save_exchange_rule: SaveExchangeRuleMode,

    #[cfg_attr(feature = "clap", clap(long, value_delimiter = ','))]
    pub selected_types_to_process: Vec<String>,

    #[cfg_attr(feature = "clap", clap(long, value_delimiter = ','))]
    pub cohort_names: Vec<String>,

    #[cfg_attr(feature = "clap", clap(long, env = "OMRS_LOG_FORMAT", default_value = "full"))]
    pub log_format: LogFormat,

    #[cfg_attr(feature = "clap", clap(long, env = "OMRS_LOG_FILTER", default_value = "info"))]
    pub log_filter: String,
}

impl CohortMemberConfig {
    #[must_use]
    pub fn local_metadata_collection_id(&self) -> MetadataCollectionId {
        MetadataCollectionId::new(self.local_metadata_collection_id)
    }
}

/// Output format for the `tracing-subscriber` layer (mirrors the storage crate's
/// `LoggingArgs::log_format`), simplified to drop the OTLP exporter this core doesn't carry.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
pub enum LogFormat {
    #[default]
    Full,
    Pretty,
    Json,
    Compact,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Full => "full",
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Compact => "compact",
        };
        fmt.write_str(text)
    }
}

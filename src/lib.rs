//! Borealis provider core.
//!
//! This crate is the reconciliation core of an infrastructure-as-code
//! provider for the Borealis data warehouse: it turns declarative resource
//! configuration into the minimal sequence of remote DDL calls, reads
//! remote state back, and keeps stored state records upgradeable across
//! schema versions. Transport, authentication, and SQL rendering live
//! behind the [`client::ServiceClient`] trait; everything in front of it
//! is pure, deterministic, and testable against the in-memory fake in
//! [`testing`].
//!
//! # Overview
//!
//! - **Identifiers**: [`ident::ObjectIdentifier`], a sum type over the
//!   account/database/schema qualification levels, with a quoting-aware
//!   parser and a stable pipe-delimited state encoding.
//! - **Values**: [`value`], the codec between the Service's all-text
//!   property bags and declared attribute values, including the tri-state
//!   boolean and the integer unset sentinel.
//! - **Schemas**: [`schema::ResourceSchema`], per-attribute descriptors
//!   carrying recreate rules, validators, suppression chains, and flows.
//! - **Planning**: [`reconcile::plan_update`], which folds detected
//!   changes into per-flow SET/UNSET bags.
//! - **Dispatch**: [`lifecycle::Dispatcher`], one wrapped entry point per
//!   lifecycle operation, with deadlines, retries, preview gating, and a
//!   re-read after every write.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use borealis_provider::{init_logging, Dispatcher, default_registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     let client = Arc::new(MyClient::connect().await?);
//!     let dispatcher = Dispatcher::new(client, default_registry()?);
//!     let response = dispatcher.create("borealis_warehouse", config).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod drift;
pub mod error;
pub mod ident;
pub mod lifecycle;
pub mod logging;
pub mod migrate;
pub mod reconcile;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod state;
pub mod suppress;
pub mod testing;
pub mod validation;
pub mod value;

pub use client::{CallContext, ObjectKind, ServiceClient, TrackingMarker};
pub use config::ProviderConfig;
pub use error::ServiceError;
pub use ident::ObjectIdentifier;
pub use lifecycle::{Dispatcher, LifecycleResponse};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use resources::{default_registry, ResourceDefinition, ResourceRegistry};
pub use schema::{AttributeDescriptor, Diagnostic, DiagnosticSeverity, Operation, ResourceSchema};
pub use state::StateRecord;

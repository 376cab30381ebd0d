#![doc = "artifact-uploader-core: orchestration and reconciliation for CI artifact uploads."]

//! This crate holds the backend-agnostic logic of the uploader: resolving
//! declared artifacts into descriptors, uploading them to pre-signed
//! destinations and reconciling every descriptor into exactly one outcome.
//! Backend clients implement [`contract::IngestionApi`] outside this crate.
//!
//! # Usage
//! Build the collaborators (an `IngestionApi`, [`transfer::HttpTransfer`] and
//! [`files::LocalFiles`]) and call [`pipeline::run`].

pub mod contract;
pub mod error;
pub mod files;
pub mod pipeline;
pub mod reconcile;
pub mod resolve;
pub mod transfer;

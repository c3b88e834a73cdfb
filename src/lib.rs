//! Retrieval and canonicalization of third-party graph datasets.
//!
//! A [`Retriever`](retrieval::Retriever) turns a validated
//! [`RecipeConfig`](recipe::RecipeConfig) into a
//! [`ConstructionRequest`](request::ConstructionRequest): it fetches the raw
//! files, runs the recipe callbacks, converts the lists into the canonical
//! layout once per cache location and records their counts.

pub mod callbacks;
pub mod canonical;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod graph;
pub mod lock;
pub mod metadata;
pub mod output;
pub mod recipe;
pub mod registry;
pub mod request;
pub mod retrieval;
pub mod store;

mod vocabulary;

//! Stash-box identification core.
//!
//! This crate is the content-addressed matching engine that sits behind
//! Stash's own scanner/GraphQL surface: given local scenes, it fingerprints
//! them (C1), compares perceptual hashes under Hamming distance (C2), reads
//! local entities through a transactional repository gateway (C3), queries
//! a remote stash-box registry over GraphQL (C4), resolves remote entities
//! to local ones (C5), correlates remote results back to the scenes that
//! produced the query (C6), and submits or drafts contributions back to the
//! registry (C7).
//!
//! The embedded SQL schema, scanners, scrapers, transcoders, and browser UI
//! that normally surround this core in a full Stash deployment are out of
//! scope here; callers supply local data through [`repository::Repository`]
//! and own everything upstream of a scene/performer ID.
//!
//! ```ignore
//! use stash_identify::config::IdentifyConfig;
//! use stash_identify::identify::Identifier;
//! use stash_identify::repository::InMemoryRepository;
//! use stash_identify::stashbox::StashBoxClient;
//!
//! # async fn demo() -> Result<(), stash_identify::error::IdentifyError> {
//! let config = IdentifyConfig::default();
//! let repo = InMemoryRepository::new();
//! let client = StashBoxClient::new("https://stashdb.org/graphql", "api-key");
//! let identifier = Identifier::new(&repo, &client, config.chunk_size, config.perceptual_threshold);
//! let cancel = stash_identify::CancellationToken::new();
//! let _matches = identifier
//!     .find_by_fingerprints(&[1, 2, 3], "https://stashdb.org/graphql", &cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod draft;
pub mod error;
pub mod fingerprint;
pub mod identify;
pub mod matcher;
pub mod model;
pub mod repository;
pub mod scraped;
pub mod similarity;
pub mod stashbox;

/// Per-call cancellation handle, raced against every remote HTTP request
/// future (SPEC_FULL §5). Re-exported so callers don't need a direct
/// `tokio-util` dependency just to construct one.
pub use tokio_util::sync::CancellationToken;

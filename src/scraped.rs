//! Remote-sourced ("scraped") counterparts of the local data model.
//!
//! Values of these types are created fresh inside the orchestrator for each
//! call and handed to the caller; they are never persisted by this crate.
//! After a [`crate::matcher::EntityMatcher`] pass each carries a resolved
//! `local_id` when a confident match was found.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::model::Gender;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedScene {
    pub remote_site_id: String,
    pub title: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub date: Option<chrono::NaiveDate>,
    pub fingerprints: Vec<Fingerprint>,
    pub studio: Option<ScrapedStudio>,
    pub performers: Vec<ScrapedPerformer>,
    pub tags: Vec<ScrapedTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPerformer {
    pub remote_site_id: String,
    pub name: String,
    pub disambiguation: Option<String>,
    pub gender: Option<Gender>,
    pub urls: Vec<String>,
    pub images: Vec<String>,
    /// Deprecated single-image convenience field, populated from `images[0]`
    /// by callers that construct a `queryPerformers`-style response; kept for
    /// backward compatibility with older consumers that never adopted the
    /// `images` list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub local_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedStudio {
    pub remote_site_id: String,
    pub name: String,
    pub url: Option<String>,
    pub local_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedTag {
    pub remote_site_id: String,
    pub name: String,
    pub local_id: Option<i64>,
}

/// Trait implemented by every scraped entity kind so the matcher (C5) can be
/// written once and applied to studios, performers, and tags alike.
pub trait Scraped {
    fn remote_site_id(&self) -> &str;
    fn name(&self) -> &str;
    fn set_local_id(&mut self, id: i64);
    fn local_id(&self) -> Option<i64>;
}

impl Scraped for ScrapedPerformer {
    fn remote_site_id(&self) -> &str {
        &self.remote_site_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn set_local_id(&mut self, id: i64) {
        self.local_id = Some(id);
    }
    fn local_id(&self) -> Option<i64> {
        self.local_id
    }
}

impl Scraped for ScrapedStudio {
    fn remote_site_id(&self) -> &str {
        &self.remote_site_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn set_local_id(&mut self, id: i64) {
        self.local_id = Some(id);
    }
    fn local_id(&self) -> Option<i64> {
        self.local_id
    }
}

impl Scraped for ScrapedTag {
    fn remote_site_id(&self) -> &str {
        &self.remote_site_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn set_local_id(&mut self, id: i64) {
        self.local_id = Some(id);
    }
    fn local_id(&self) -> Option<i64> {
        self.local_id
    }
}

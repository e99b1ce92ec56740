//! Local entity data model.
//!
//! These types describe what the (out-of-scope) SQL-backed scanner/CRUD
//! layer hands to the identification core through [`crate::repository`].
//! The core never constructs or mutates them; it only reads.

use serde::{Deserialize, Serialize};

/// A remote registry identity linked to exactly one local entity per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StashId {
    pub endpoint: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: i64,
    pub title: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub date: Option<chrono::NaiveDate>,
    pub duration: Option<f64>,
    pub height: Option<i64>,
    pub codec: Option<String>,
    pub checksum: Option<String>,
    pub oshash: Option<String>,
    pub phash: Option<String>,
    pub interactive: bool,
    pub studio_id: Option<i64>,
    pub performer_ids: Vec<i64>,
    pub tag_ids: Vec<i64>,
    pub stash_ids: Vec<StashId>,
}

impl Scene {
    /// All present fingerprints in `{algorithm, hash, duration}` form, in a
    /// fixed checksum/oshash/phash order.
    pub fn fingerprints(&self) -> Vec<crate::fingerprint::Fingerprint> {
        use crate::fingerprint::{Algorithm, Fingerprint};
        let duration = self.duration.map(|d| d as i64);
        let mut out = Vec::with_capacity(3);
        if let Some(hash) = &self.checksum {
            out.push(Fingerprint {
                algorithm: Algorithm::Md5,
                hash: hash.clone(),
                duration,
            });
        }
        if let Some(hash) = &self.oshash {
            out.push(Fingerprint {
                algorithm: Algorithm::Oshash,
                hash: hash.clone(),
                duration,
            });
        }
        if let Some(hash) = &self.phash {
            out.push(Fingerprint {
                algorithm: Algorithm::Phash,
                hash: hash.clone(),
                duration,
            });
        }
        out
    }

    pub fn stash_id_for(&self, endpoint: &str) -> Option<&StashId> {
        self.stash_ids.iter().find(|s| s.endpoint == endpoint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Intersex,
    TransgenderMale,
    TransgenderFemale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub id: i64,
    pub name: String,
    pub disambiguation: Option<String>,
    pub gender: Option<Gender>,
    pub birthdate: Option<chrono::NaiveDate>,
    pub country: Option<String>,
    pub urls: Vec<String>,
    /// Per-social-network handles, e.g. `("twitter", "handle")`.
    pub handles: Vec<(String, String)>,
    pub image: Option<Vec<u8>>,
    pub stash_ids: Vec<StashId>,
}

impl Performer {
    pub fn stash_id_for(&self, endpoint: &str) -> Option<&StashId> {
        self.stash_ids.iter().find(|s| s.endpoint == endpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Studio {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub stash_ids: Vec<StashId>,
}

impl Studio {
    pub fn stash_id_for(&self, endpoint: &str) -> Option<&StashId> {
        self.stash_ids.iter().find(|s| s.endpoint == endpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub stash_ids: Vec<StashId>,
}

/// Case-insensitive, trimmed name normalisation used by the entity matcher's
/// fallback path (SPEC_FULL §4.5 step 2).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

//! Entity matcher (C5): resolve a scraped performer/studio/tag to a local
//! entity, or leave it unresolved.
//!
//! Resolution is strict priority, never a score (SPEC_FULL §4.5):
//!
//! 1. A local entity carrying a [`crate::model::StashId`] for the query
//!    endpoint whose `remote_id` matches the scraped entity's
//!    `remote_site_id` — an unambiguous identity link.
//! 2. Failing that, a local entity whose normalised name is the *unique*
//!    normalised-name match among all candidates.
//! 3. Otherwise the entity is left unresolved (`local_id` stays `None`);
//!    this is not an error, just information the caller acts on.

use crate::model::normalize_name;
use crate::scraped::Scraped;

/// Minimal view a local entity must expose to be matchable. Implemented by
/// `&Performer`, `&Studio`, `&Tag` via the blanket impl below.
pub trait LocalEntity {
    fn id(&self) -> i64;
    fn name(&self) -> &str;
    fn stash_id_for(&self, endpoint: &str) -> Option<&crate::model::StashId>;
}

impl LocalEntity for crate::model::Performer {
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn stash_id_for(&self, endpoint: &str) -> Option<&crate::model::StashId> {
        crate::model::Performer::stash_id_for(self, endpoint)
    }
}

impl LocalEntity for crate::model::Studio {
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn stash_id_for(&self, endpoint: &str) -> Option<&crate::model::StashId> {
        crate::model::Studio::stash_id_for(self, endpoint)
    }
}

impl LocalEntity for crate::model::Tag {
    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn stash_id_for(&self, endpoint: &str) -> Option<&crate::model::StashId> {
        self.stash_ids.iter().find(|s| s.endpoint == endpoint)
    }
}

/// Matches scraped entities of one kind against a pool of local candidates
/// for one stash-box `endpoint`.
pub struct EntityMatcher<'a> {
    endpoint: &'a str,
}

impl<'a> EntityMatcher<'a> {
    pub fn new(endpoint: &'a str) -> Self {
        Self { endpoint }
    }

    /// Resolve `scraped` in place against `candidates`. Returns whether a
    /// match was found (equivalently, whether `scraped.local_id()` is now
    /// `Some`).
    pub fn resolve<S, L>(&self, scraped: &mut S, candidates: &[L]) -> bool
    where
        S: Scraped,
        L: LocalEntity,
    {
        if let Some(id) = self.match_by_stash_id(scraped, candidates) {
            scraped.set_local_id(id);
            return true;
        }
        if let Some(id) = self.match_by_unique_name(scraped, candidates) {
            scraped.set_local_id(id);
            return true;
        }
        false
    }

    fn match_by_stash_id<S, L>(&self, scraped: &S, candidates: &[L]) -> Option<i64>
    where
        S: Scraped,
        L: LocalEntity,
    {
        candidates.iter().find_map(|c| {
            c.stash_id_for(self.endpoint)
                .filter(|stash_id| stash_id.remote_id == scraped.remote_site_id())
                .map(|_| c.id())
        })
    }

    fn match_by_unique_name<S, L>(&self, scraped: &S, candidates: &[L]) -> Option<i64>
    where
        S: Scraped,
        L: LocalEntity,
    {
        let target = normalize_name(scraped.name());
        let mut matches = candidates
            .iter()
            .filter(|c| normalize_name(c.name()) == target);
        let first = matches.next()?;
        if matches.next().is_some() {
            // More than one local entity shares this name: ambiguous, leave
            // unresolved rather than guess.
            return None;
        }
        Some(first.id())
    }
}

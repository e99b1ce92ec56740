//! Identification orchestrator (C6): correlates local scenes to remote
//! registry results by fingerprint, and submits fingerprints back.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::{IdentifyError, IdentifyResult};
use crate::fingerprint::{decode_phash, Algorithm};
use crate::matcher::EntityMatcher;
use crate::repository::Repository;
use crate::scraped::{ScrapedPerformer, ScrapedScene};
use crate::similarity::similar;
use crate::stashbox::{FingerprintQuery, StashBoxClient};
use crate::CancellationToken;

/// `(queries, fp_to_scene, phash_to_scene)`, see [`Identifier::build_query_indexes`].
type QueryIndexes = (
    Vec<FingerprintQuery>,
    HashMap<String, Vec<usize>>,
    HashMap<u64, Vec<usize>>,
);

/// `query_performers` result entry: the local performer ID paired with every
/// remote candidate `search_performer` returned for its name.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformerQueryResult {
    pub query_key: i64,
    pub results: Vec<ScrapedPerformer>,
}

pub struct Identifier<'a, R: Repository> {
    repository: &'a R,
    client: &'a StashBoxClient,
    chunk_size: usize,
    perceptual_threshold: u32,
}

impl<'a, R: Repository> Identifier<'a, R> {
    pub fn new(
        repository: &'a R,
        client: &'a StashBoxClient,
        chunk_size: usize,
        perceptual_threshold: u32,
    ) -> Self {
        Self {
            repository,
            client,
            chunk_size,
            perceptual_threshold,
        }
    }

    /// Per-input fan-out: for each input scene (in order), the remote
    /// scenes that match it by exact or perceptual fingerprint. Each
    /// returned scene's studio/performers/tags are enriched with resolved
    /// local IDs via C5, scoped to `endpoint`.
    pub async fn find_by_fingerprints(
        &self,
        scene_ids: &[i64],
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> IdentifyResult<Vec<Vec<ScrapedScene>>> {
        let (queries, fp_to_scene, phash_to_scene) = self.build_query_indexes(scene_ids)?;
        let mut all_remote = self.query_chunked(&queries, cancel).await?;
        self.enrich_remote_scenes(&mut all_remote, endpoint)?;

        let mut result: Vec<Vec<ScrapedScene>> = vec![Vec::new(); scene_ids.len()];
        for remote in all_remote {
            let mut contributes_to: Vec<usize> = Vec::new();
            for fp in &remote.fingerprints {
                if let Some(idxs) = fp_to_scene.get(&fp.hash) {
                    contributes_to.extend(idxs.iter().copied());
                }
                if fp.algorithm == Algorithm::Phash {
                    match decode_phash(&fp.hash) {
                        Ok(bits) => {
                            let value = bits as u64;
                            for (&key, idxs) in &phash_to_scene {
                                if similar(value, key, self.perceptual_threshold) {
                                    contributes_to.extend(idxs.iter().copied());
                                }
                            }
                        }
                        Err(err) => {
                            warn!(hash = %fp.hash, error = %err, "skipping malformed phash in remote result");
                        }
                    }
                }
            }
            contributes_to.sort_unstable();
            contributes_to.dedup();
            for idx in contributes_to {
                result[idx].push(remote.clone());
            }
        }
        Ok(result)
    }

    /// Same correlation as [`Self::find_by_fingerprints`] but flattened,
    /// without per-input attribution.
    pub async fn find_by_fingerprints_flat(
        &self,
        scene_ids: &[i64],
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> IdentifyResult<Vec<ScrapedScene>> {
        let (queries, _, _) = self.build_query_indexes(scene_ids)?;
        let mut all_remote = self.query_chunked(&queries, cancel).await?;
        self.enrich_remote_scenes(&mut all_remote, endpoint)?;
        Ok(all_remote)
    }

    /// C5 enrichment pass: inside one read transaction, load the candidate
    /// local studios/performers/tags and resolve each remote scene's nested
    /// entities against them for `endpoint`, recording a local ID on each hit.
    fn enrich_remote_scenes(
        &self,
        scenes: &mut [ScrapedScene],
        endpoint: &str,
    ) -> IdentifyResult<()> {
        self.repository.with_read_txn(|txn| {
            let studios = txn.all_studios()?;
            let performers = txn.all_performers()?;
            let tags = txn.all_tags()?;
            let matcher = EntityMatcher::new(endpoint);
            for scene in scenes.iter_mut() {
                if let Some(studio) = scene.studio.as_mut() {
                    matcher.resolve(studio, &studios);
                }
                for performer in &mut scene.performers {
                    matcher.resolve(performer, &performers);
                }
                for tag in &mut scene.tags {
                    matcher.resolve(tag, &tags);
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    fn build_query_indexes(&self, scene_ids: &[i64]) -> IdentifyResult<QueryIndexes> {
        let mut queries = Vec::new();
        let mut fp_to_scene: HashMap<String, Vec<usize>> = HashMap::new();
        let mut phash_to_scene: HashMap<u64, Vec<usize>> = HashMap::new();

        self.repository.with_read_txn(|txn| {
            for (idx, &scene_id) in scene_ids.iter().enumerate() {
                let scene = txn.find_scene(scene_id)?;
                for fp in scene.fingerprints() {
                    queries.push(FingerprintQuery {
                        algorithm: fp.algorithm,
                        hash: fp.hash.clone(),
                    });
                    fp_to_scene.entry(fp.hash.clone()).or_default().push(idx);
                    if fp.algorithm == Algorithm::Phash
                        && let Ok(bits) = decode_phash(&fp.hash)
                    {
                        phash_to_scene.entry(bits as u64).or_default().push(idx);
                    }
                }
            }
            Ok(())
        })?;

        Ok((queries, fp_to_scene, phash_to_scene))
    }

    async fn query_chunked(
        &self,
        queries: &[FingerprintQuery],
        cancel: &CancellationToken,
    ) -> IdentifyResult<Vec<ScrapedScene>> {
        let mut all_remote = Vec::new();
        for chunk in queries.chunks(self.chunk_size.max(1)) {
            let scenes = self
                .client
                .find_scenes_by_full_fingerprints(chunk, cancel)
                .await?;
            all_remote.extend(scenes);
        }
        Ok(all_remote)
    }

    /// Submit every present fingerprint of each input scene that carries a
    /// StashID for `endpoint` and a known duration. At-least-once: a failure
    /// partway through is reported, earlier submissions are not rolled back.
    pub async fn submit_fingerprints(
        &self,
        scene_ids: &[i64],
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> IdentifyResult<usize> {
        let mut submissions = Vec::new();
        self.repository.with_read_txn(|txn| {
            for &scene_id in scene_ids {
                let scene = txn.find_scene(scene_id)?;
                if scene.duration.is_none() {
                    continue;
                }
                let Some(stash_id) = scene.stash_id_for(endpoint) else {
                    continue;
                };
                for fp in scene.fingerprints() {
                    submissions.push((stash_id.remote_id.clone(), fp));
                }
            }
            Ok(())
        })?;

        let mut submitted = 0;
        for (remote_scene_id, fp) in &submissions {
            self.client
                .submit_fingerprint(remote_scene_id, fp, cancel)
                .await?;
            submitted += 1;
        }
        info!(submitted, "submitted scene fingerprints");
        Ok(submitted)
    }

    /// For each local performer with a name, search the remote registry.
    pub async fn query_performers(
        &self,
        local_performer_ids: &[i64],
        cancel: &CancellationToken,
    ) -> IdentifyResult<Vec<PerformerQueryResult>> {
        let names: Vec<(i64, String)> = self.repository.with_read_txn(|txn| {
            local_performer_ids
                .iter()
                .map(|&id| {
                    let performer = txn.find_performer(id)?;
                    Ok((id, performer.name))
                })
                .collect()
        })?;

        let mut results = Vec::with_capacity(names.len());
        for (id, name) in names {
            if name.trim().is_empty() {
                results.push(PerformerQueryResult {
                    query_key: id,
                    results: Vec::new(),
                });
                continue;
            }
            let found = self.client.search_performer(&name, cancel).await?;
            results.push(PerformerQueryResult {
                query_key: id,
                results: found,
            });
        }
        Ok(results)
    }
}

impl From<crate::repository::RepositoryError> for IdentifyError {
    fn from(err: crate::repository::RepositoryError) -> Self {
        match err {
            crate::repository::RepositoryError::NotFound { entity, id } => {
                IdentifyError::NotFound { entity, id }
            }
            other => IdentifyError::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::encode_phash;
    use crate::model::{Scene, StashId};
    use crate::repository::InMemoryRepository;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scene_with_phash(id: i64, phash_bits: i64) -> Scene {
        Scene {
            id,
            title: None,
            details: None,
            url: None,
            date: None,
            duration: Some(60.0),
            height: None,
            codec: None,
            checksum: None,
            oshash: None,
            phash: Some(encode_phash(phash_bits)),
            interactive: false,
            studio_id: None,
            performer_ids: vec![],
            tag_ids: vec![],
            stash_ids: vec![StashId {
                endpoint: "https://stashdb.org/graphql".into(),
                remote_id: "remote-scene-1".into(),
            }],
        }
    }

    #[tokio::test]
    async fn find_by_fingerprints_correlates_exact_hash_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "findScenesByFullFingerprints": [{
                        "id": "remote-1",
                        "title": "Match",
                        "details": null,
                        "url": null,
                        "date": null,
                        "fingerprints": [{"algorithm": "PHASH", "hash": encode_phash(0), "duration": 60}],
                        "studio": null,
                        "performers": [],
                        "tags": []
                    }]
                }
            })))
            .mount(&server)
            .await;

        let repo = InMemoryRepository::new();
        repo.insert_scene(scene_with_phash(1, 0));
        repo.insert_scene(scene_with_phash(2, 0xFF));

        let client = StashBoxClient::new(server.uri(), "secret");
        let identifier = Identifier::new(&repo, &client, 100, 4);
        let cancel = CancellationToken::new();

        let result = identifier
            .find_by_fingerprints(&[1, 2], "https://stashdb.org/graphql", &cancel)
            .await
            .unwrap();
        assert_eq!(result[0].len(), 1);
        assert_eq!(result[1].len(), 0);
    }

    #[tokio::test]
    async fn find_by_fingerprints_resolves_nested_entities_by_stash_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "findScenesByFullFingerprints": [{
                        "id": "remote-1",
                        "title": "Match",
                        "details": null,
                        "url": null,
                        "date": null,
                        "fingerprints": [{"algorithm": "PHASH", "hash": encode_phash(0), "duration": 60}],
                        "studio": {"id": "remote-studio-1", "name": "Wrong Name", "url": null},
                        "performers": [{
                            "id": "remote-performer-1",
                            "name": "Wrong Name",
                            "disambiguation": null,
                            "gender": null,
                            "urls": [],
                            "images": []
                        }],
                        "tags": [{"id": "remote-tag-1", "name": "tag one"}]
                    }]
                }
            })))
            .mount(&server)
            .await;

        const ENDPOINT: &str = "https://stashdb.org/graphql";
        let repo = InMemoryRepository::new();
        repo.insert_scene(scene_with_phash(1, 0));
        repo.insert_studio(crate::model::Studio {
            id: 10,
            name: "Local Studio".into(),
            url: None,
            stash_ids: vec![StashId {
                endpoint: ENDPOINT.into(),
                remote_id: "remote-studio-1".into(),
            }],
        });
        repo.insert_performer(crate::model::Performer {
            id: 20,
            name: "Local Performer".into(),
            disambiguation: None,
            gender: None,
            birthdate: None,
            country: None,
            urls: vec![],
            handles: vec![],
            image: None,
            stash_ids: vec![StashId {
                endpoint: ENDPOINT.into(),
                remote_id: "remote-performer-1".into(),
            }],
        });
        repo.insert_tag(crate::model::Tag {
            id: 30,
            name: "Tag One".into(),
            stash_ids: vec![],
        });

        let client = StashBoxClient::new(server.uri(), "secret");
        let identifier = Identifier::new(&repo, &client, 100, 4);
        let cancel = CancellationToken::new();

        let result = identifier
            .find_by_fingerprints(&[1], ENDPOINT, &cancel)
            .await
            .unwrap();
        let matched = &result[0][0];
        assert_eq!(matched.studio.as_ref().unwrap().local_id, Some(10));
        assert_eq!(matched.performers[0].local_id, Some(20));
        assert_eq!(matched.tags[0].local_id, Some(30));
    }

    #[tokio::test]
    async fn submit_fingerprints_skips_scenes_without_stash_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "submitFingerprint": true }
            })))
            .mount(&server)
            .await;

        let repo = InMemoryRepository::new();
        let mut no_stash_id = scene_with_phash(1, 0);
        no_stash_id.stash_ids.clear();
        repo.insert_scene(no_stash_id);
        repo.insert_scene(scene_with_phash(2, 0));

        let client = StashBoxClient::new(server.uri(), "secret");
        let identifier = Identifier::new(&repo, &client, 100, 4);
        let cancel = CancellationToken::new();

        let submitted = identifier
            .submit_fingerprints(&[1, 2], "https://stashdb.org/graphql", &cancel)
            .await
            .unwrap();
        assert_eq!(submitted, 1);
    }

    #[tokio::test]
    async fn submit_fingerprints_skips_scenes_without_known_duration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "submitFingerprint": true }
            })))
            .mount(&server)
            .await;

        let repo = InMemoryRepository::new();
        let mut no_duration = scene_with_phash(1, 0);
        no_duration.duration = None;
        repo.insert_scene(no_duration);
        repo.insert_scene(scene_with_phash(2, 0));

        let client = StashBoxClient::new(server.uri(), "secret");
        let identifier = Identifier::new(&repo, &client, 100, 4);
        let cancel = CancellationToken::new();

        let submitted = identifier
            .submit_fingerprints(&[1, 2], "https://stashdb.org/graphql", &cancel)
            .await
            .unwrap();
        assert_eq!(submitted, 1);
    }

    #[tokio::test]
    async fn find_by_fingerprints_missing_scene_is_not_found() {
        let server = MockServer::start().await;
        let repo = InMemoryRepository::new();
        let client = StashBoxClient::new(server.uri(), "secret");
        let identifier = Identifier::new(&repo, &client, 100, 4);
        let cancel = CancellationToken::new();

        let err = identifier
            .find_by_fingerprints(&[999], "https://stashdb.org/graphql", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentifyError::NotFound { id: 999, .. }));
    }
}

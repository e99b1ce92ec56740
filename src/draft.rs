//! Draft submitter (C7): snapshots a local scene or performer and posts it
//! to a stash-box endpoint as a draft contribution.

use tracing::warn;

use crate::error::IdentifyResult;
use crate::model::{Performer, Scene};
use crate::repository::Repository;
use crate::stashbox::{DraftSubmission, FingerprintQuery, PerformerDraftInput, SceneDraftInput, StashBoxClient};
use crate::CancellationToken;

pub struct DraftSubmitter<'a, R: Repository> {
    repository: &'a R,
    client: &'a StashBoxClient,
}

impl<'a, R: Repository> DraftSubmitter<'a, R> {
    pub fn new(repository: &'a R, client: &'a StashBoxClient) -> Self {
        Self { repository, client }
    }

    /// Snapshot scene attributes inside a read transaction, then post a
    /// draft outside it. A missing or unreadable image degrades to an
    /// imageless draft rather than failing the call.
    pub async fn submit_scene_draft(
        &self,
        scene_id: i64,
        endpoint: &str,
        image_path: Option<&std::path::Path>,
        cancel: &CancellationToken,
    ) -> IdentifyResult<DraftSubmission> {
        let input = self.repository.with_read_txn(|txn| {
            let scene = txn.find_scene(scene_id)?;
            let performers = txn.find_performers_by_scene(scene_id)?;
            let tags = txn.find_tags_by_scene(scene_id)?;
            let studio = match scene.studio_id {
                Some(id) => Some(txn.find_studio(id)?),
                None => None,
            };
            Ok(scene_draft_input(&scene, studio.as_ref(), &performers, tags.iter().map(|t| t.name.clone()).collect(), endpoint))
        })?;

        let image = match image_path {
            Some(path) => read_image_best_effort(path).await,
            None => None,
        };

        Ok(self.client.submit_scene_draft(&input, image, cancel).await?)
    }

    /// Snapshot performer attributes and post a draft. The image comes from
    /// the performer's stored bytes, not a path.
    pub async fn submit_performer_draft(
        &self,
        performer_id: i64,
        _endpoint: &str,
        cancel: &CancellationToken,
    ) -> IdentifyResult<DraftSubmission> {
        let (input, image) = self.repository.with_read_txn(|txn| {
            let performer = txn.find_performer(performer_id)?;
            let input = performer_draft_input(&performer);
            Ok((input, performer.image.clone()))
        })?;

        Ok(self
            .client
            .submit_performer_draft(&input, image, cancel)
            .await?)
    }
}

fn scene_draft_input(
    scene: &Scene,
    studio: Option<&crate::model::Studio>,
    performers: &[Performer],
    tag_names: Vec<String>,
    endpoint: &str,
) -> SceneDraftInput {
    let performer_names = performers.iter().map(|p| p.name.clone()).collect();
    let performer_remote_ids = performers
        .iter()
        .map(|p| p.stash_id_for(endpoint).map(|s| s.remote_id.clone()))
        .collect();

    let fingerprints: Vec<FingerprintQuery> = if scene.duration.is_some() {
        scene
            .fingerprints()
            .iter()
            .map(|fp| FingerprintQuery {
                algorithm: fp.algorithm,
                hash: fp.hash.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    SceneDraftInput {
        title: scene.title.clone(),
        details: scene.details.clone(),
        url: scene.url.clone(),
        date: scene.date,
        studio_name: studio.map(|s| s.name.clone()),
        studio_remote_id: studio.and_then(|s| s.stash_id_for(endpoint)).map(|s| s.remote_id.clone()),
        performer_names,
        performer_remote_ids,
        tag_names,
        fingerprints,
    }
}

fn performer_draft_input(performer: &Performer) -> PerformerDraftInput {
    let mut urls = performer.urls.clone();
    for (network, handle) in &performer.handles {
        if let Some(url) = synthesize_handle_url(network, handle) {
            urls.push(url);
        }
    }
    PerformerDraftInput {
        name: performer.name.clone(),
        disambiguation: performer.disambiguation.clone(),
        urls,
    }
}

/// Synthesise a profile URL from a per-network handle, e.g. a twitter
/// handle `"jdoe"` becomes `https://twitter.com/jdoe`.
fn synthesize_handle_url(network: &str, handle: &str) -> Option<String> {
    let base = match network.to_ascii_lowercase().as_str() {
        "twitter" | "x" => "https://twitter.com",
        "instagram" => "https://instagram.com",
        _ => return None,
    };
    Some(format!("{base}/{handle}"))
}

async fn read_image_best_effort(path: &std::path::Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "draft image unreadable, submitting without it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scene, Studio};
    use crate::repository::InMemoryRepository;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scene() -> Scene {
        Scene {
            id: 1,
            title: Some("Title".into()),
            details: None,
            url: None,
            date: None,
            duration: Some(60.0),
            height: None,
            codec: None,
            checksum: Some("a".repeat(32)),
            oshash: None,
            phash: None,
            interactive: false,
            studio_id: Some(5),
            performer_ids: vec![],
            tag_ids: vec![],
            stash_ids: vec![],
        }
    }

    #[tokio::test]
    async fn submit_scene_draft_with_unreadable_image_still_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "submitSceneDraft": { "id": "draft-1" } }
            })))
            .mount(&server)
            .await;

        let repo = InMemoryRepository::new();
        repo.insert_scene(scene());
        repo.insert_studio(Studio {
            id: 5,
            name: "Studio".into(),
            url: None,
            stash_ids: vec![],
        });

        let client = StashBoxClient::new(server.uri(), "secret");
        let submitter = DraftSubmitter::new(&repo, &client);
        let cancel = CancellationToken::new();

        let result = submitter
            .submit_scene_draft(
                1,
                "https://stashdb.org/graphql",
                Some(std::path::Path::new("/nonexistent/path")),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(result.id, "draft-1");
    }

    #[test]
    fn twitter_handle_becomes_profile_url() {
        assert_eq!(
            synthesize_handle_url("twitter", "jdoe"),
            Some("https://twitter.com/jdoe".to_string())
        );
        assert_eq!(synthesize_handle_url("unknown-network", "jdoe"), None);
    }
}

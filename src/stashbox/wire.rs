//! GraphQL payload construction and response parsing for one stash-box
//! endpoint. Kept separate from [`super::StashBoxClient`] so the
//! request/response shapes can be unit-tested without an HTTP round trip.

use chrono::NaiveDate;
use serde_json::{json, Value};

use super::RemoteError;
use crate::fingerprint::{Algorithm, Fingerprint};
use crate::scraped::{ScrapedPerformer, ScrapedScene, ScrapedStudio, ScrapedTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintQuery {
    pub algorithm: Algorithm,
    pub hash: String,
}

impl From<&Fingerprint> for FingerprintQuery {
    fn from(fp: &Fingerprint) -> Self {
        Self {
            algorithm: fp.algorithm,
            hash: fp.hash.clone(),
        }
    }
}

/// Snapshot of a local scene's attributes as submitted in a draft (SPEC_FULL
/// §4.6.4). Built once per `submit_scene_draft` call, outside the HTTP
/// layer, so consecutive calls over an unchanged scene serialise
/// byte-identically.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDraftInput {
    pub title: Option<String>,
    pub details: Option<String>,
    pub url: Option<String>,
    pub date: Option<NaiveDate>,
    pub studio_name: Option<String>,
    pub studio_remote_id: Option<String>,
    pub performer_names: Vec<String>,
    pub performer_remote_ids: Vec<Option<String>>,
    pub tag_names: Vec<String>,
    pub fingerprints: Vec<FingerprintQuery>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformerDraftInput {
    pub name: String,
    pub disambiguation: Option<String>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSubmission {
    pub id: String,
}

pub fn search_scene_query(term: &str) -> Value {
    json!({
        "query": "query($term: String!) { searchScene(term: $term) { id title details url date fingerprints { algorithm hash duration } studio { id name url } performers { id name disambiguation } tags { id name } } }",
        "variables": { "term": term },
    })
}

pub fn search_performer_query(term: &str) -> Value {
    json!({
        "query": "query($term: String!) { searchPerformer(term: $term) { id name disambiguation gender urls images } }",
        "variables": { "term": term },
    })
}

pub fn find_performer_query(id: &str) -> Value {
    json!({
        "query": "query($id: ID!) { findPerformer(id: $id) { id name disambiguation gender urls images } }",
        "variables": { "id": id },
    })
}

pub fn find_scenes_by_fingerprints_query(fingerprints: &[FingerprintQuery]) -> Value {
    let fps: Vec<Value> = fingerprints
        .iter()
        .map(|fp| json!({ "algorithm": fp.algorithm.as_str(), "hash": fp.hash }))
        .collect();
    json!({
        "query": "query($fingerprints: [FingerprintQueryInput!]!) { findScenesByFullFingerprints(fingerprints: $fingerprints) { id title details url date fingerprints { algorithm hash duration } studio { id name url } performers { id name disambiguation } tags { id name } } }",
        "variables": { "fingerprints": fps },
    })
}

pub fn submit_fingerprint_mutation(scene_remote_id: &str, fingerprint: &Fingerprint) -> Value {
    json!({
        "query": "mutation($input: FingerprintSubmission!) { submitFingerprint(input: $input) }",
        "variables": {
            "input": {
                "scene_id": scene_remote_id,
                "fingerprint": {
                    "algorithm": fingerprint.algorithm.as_str(),
                    "hash": fingerprint.hash,
                    "duration": fingerprint.duration,
                },
            },
        },
    })
}

pub fn me_query() -> Value {
    json!({ "query": "query { me { id } }" })
}

/// Build the `operations` JSON field for a scene draft multipart upload.
/// The shape and field order are fixed so two calls over the same input
/// serialise identically (SPEC_FULL's draft-idempotence property).
pub fn scene_draft_operations(input: &SceneDraftInput) -> Value {
    let performers: Vec<Value> = input
        .performer_names
        .iter()
        .zip(input.performer_remote_ids.iter())
        .map(|(name, remote_id)| {
            json!({
                "name": name,
                "performer_id": remote_id,
            })
        })
        .collect();
    let fingerprints: Vec<Value> = input
        .fingerprints
        .iter()
        .map(|fp| json!({ "algorithm": fp.algorithm.as_str(), "hash": fp.hash }))
        .collect();

    json!({
        "query": "mutation($input: SceneDraftInput!) { submitSceneDraft(input: $input) { id } }",
        "variables": {
            "input": {
                "title": input.title,
                "details": input.details,
                "url": input.url,
                "date": input.date,
                "studio": input.studio_name.as_ref().map(|name| json!({
                    "name": name,
                    "studio_id": input.studio_remote_id,
                })),
                "performers": performers,
                "tags": input.tag_names,
                "fingerprints": fingerprints,
                "image": Value::Null,
            },
        },
        "operationName": "",
    })
}

pub fn performer_draft_operations(input: &PerformerDraftInput) -> Value {
    json!({
        "query": "mutation($input: PerformerDraftInput!) { submitPerformerDraft(input: $input) { id } }",
        "variables": {
            "input": {
                "name": input.name,
                "disambiguation": input.disambiguation,
                "urls": input.urls,
                "image": Value::Null,
            },
        },
        "operationName": "",
    })
}

fn data_field<'a>(body: &'a Value, field: &str) -> Result<&'a Value, RemoteError> {
    body.get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty())
        .map(|errors| {
            let message = errors
                .first()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error")
                .to_string();
            Err(RemoteError::ErrRemote { status: 200, message })
        })
        .unwrap_or_else(|| {
            body.get("data")
                .and_then(|d| d.get(field))
                .ok_or_else(|| RemoteError::MalformedResponse(format!("missing `data.{field}`")))
        })
}

pub fn parse_scenes(body: &Value, field: &str) -> Result<Vec<ScrapedScene>, RemoteError> {
    let data = data_field(body, field)?;
    let items = data
        .as_array()
        .ok_or_else(|| RemoteError::MalformedResponse(format!("`{field}` is not an array")))?;
    items.iter().map(parse_scene).collect()
}

fn parse_scene(value: &Value) -> Result<ScrapedScene, RemoteError> {
    let remote_site_id = required_str(value, "id")?;
    let fingerprints = value
        .get("fingerprints")
        .and_then(Value::as_array)
        .map(|fps| fps.iter().filter_map(parse_fingerprint).collect())
        .unwrap_or_default();
    let studio = value
        .get("studio")
        .filter(|s| !s.is_null())
        .map(parse_studio)
        .transpose()?;
    let performers = value
        .get("performers")
        .and_then(Value::as_array)
        .map(|ps| ps.iter().filter_map(|p| parse_performer(p).ok()).collect())
        .unwrap_or_default();
    let tags = value
        .get("tags")
        .and_then(Value::as_array)
        .map(|ts| ts.iter().filter_map(|t| parse_tag(t).ok()).collect())
        .unwrap_or_default();

    Ok(ScrapedScene {
        remote_site_id,
        title: optional_str(value, "title"),
        details: optional_str(value, "details"),
        url: optional_str(value, "url"),
        date: value
            .get("date")
            .and_then(Value::as_str)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        fingerprints,
        studio,
        performers,
        tags,
    })
}

fn parse_fingerprint(value: &Value) -> Option<Fingerprint> {
    let algorithm = match value.get("algorithm").and_then(Value::as_str)? {
        "MD5" => Algorithm::Md5,
        "OSHASH" => Algorithm::Oshash,
        "PHASH" => Algorithm::Phash,
        _ => return None,
    };
    Some(Fingerprint {
        algorithm,
        hash: value.get("hash").and_then(Value::as_str)?.to_string(),
        duration: value.get("duration").and_then(Value::as_i64),
    })
}

fn parse_studio(value: &Value) -> Result<ScrapedStudio, RemoteError> {
    Ok(ScrapedStudio {
        remote_site_id: required_str(value, "id")?,
        name: required_str(value, "name")?,
        url: optional_str(value, "url"),
        local_id: None,
    })
}

fn parse_tag(value: &Value) -> Result<ScrapedTag, RemoteError> {
    Ok(ScrapedTag {
        remote_site_id: required_str(value, "id")?,
        name: required_str(value, "name")?,
        local_id: None,
    })
}

pub fn parse_performers(body: &Value, field: &str) -> Result<Vec<ScrapedPerformer>, RemoteError> {
    let data = data_field(body, field)?;
    let items = data
        .as_array()
        .ok_or_else(|| RemoteError::MalformedResponse(format!("`{field}` is not an array")))?;
    items.iter().map(parse_performer).collect()
}

pub fn parse_single_performer(
    body: &Value,
    field: &str,
) -> Result<Option<ScrapedPerformer>, RemoteError> {
    let data = data_field(body, field)?;
    if data.is_null() {
        return Ok(None);
    }
    parse_performer(data).map(Some)
}

fn parse_performer(value: &Value) -> Result<ScrapedPerformer, RemoteError> {
    let images: Vec<String> = value
        .get("images")
        .and_then(Value::as_array)
        .map(|imgs| {
            imgs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    // Deprecated single-image compat field, populated from the first image.
    let image = images.first().cloned();

    let gender = value
        .get("gender")
        .and_then(Value::as_str)
        .and_then(|g| serde_json::from_value(Value::String(g.to_string())).ok());

    Ok(ScrapedPerformer {
        remote_site_id: required_str(value, "id")?,
        name: required_str(value, "name")?,
        disambiguation: optional_str(value, "disambiguation"),
        gender,
        urls: value
            .get("urls")
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        images,
        image,
        local_id: None,
    })
}

pub fn parse_bool(body: &Value, field: &str) -> Result<bool, RemoteError> {
    data_field(body, field)?
        .as_bool()
        .ok_or_else(|| RemoteError::MalformedResponse(format!("`{field}` is not a bool")))
}

pub fn parse_draft(body: &Value, field: &str) -> Result<DraftSubmission, RemoteError> {
    let data = data_field(body, field)?;
    Ok(DraftSubmission {
        id: required_str(data, "id")?,
    })
}

pub fn parse_me(body: &Value) -> Result<String, RemoteError> {
    let data = data_field(body, "me")?;
    required_str(data, "id")
}

fn required_str(value: &Value, field: &str) -> Result<String, RemoteError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::MalformedResponse(format!("missing `{field}`")))
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_draft_operations_round_trip_is_stable() {
        let input = SceneDraftInput {
            title: Some("Title".into()),
            details: None,
            url: None,
            date: None,
            studio_name: Some("Studio".into()),
            studio_remote_id: None,
            performer_names: vec!["Jane".into()],
            performer_remote_ids: vec![None],
            tag_names: vec!["Tag".into()],
            fingerprints: vec![],
        };
        let first = scene_draft_operations(&input).to_string();
        let second = scene_draft_operations(&input).to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn graphql_errors_surface_as_remote_error() {
        let body = json!({ "errors": [{"message": "bad term"}] });
        let err = parse_scenes(&body, "searchScene").unwrap_err();
        assert!(matches!(err, RemoteError::ErrRemote { .. }));
    }

    #[test]
    fn missing_data_field_is_malformed() {
        let body = json!({ "data": {} });
        let err = parse_scenes(&body, "searchScene").unwrap_err();
        assert!(matches!(err, RemoteError::MalformedResponse(_)));
    }
}

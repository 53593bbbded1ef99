//! HTTP neighbor backends: a GET endpoint answering for an existing row and
//! an upload endpoint answering for a posted file.
//!
//! Both answer with `{"neighbors": [{"id": .., "distance": ..}], "query": {"x": .., "y": ..}}`.
//! Transport and decoding failures never reach the caller: they are logged
//! and produce an empty answer.

use async_trait::async_trait;
use reqwest::{multipart, Client, Request, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use atlas_core::traits::{NearestNeighbors, SearchOptions};
use atlas_core::types::{IdTuple, Point, RowId};
use atlas_core::{Error, Result};

/// Largest `k` the neighbor endpoint accepts.
pub const REMOTE_K_CEILING: usize = 500;
/// Largest `k` the upload endpoint accepts.
pub const UPLOAD_K_CEILING: usize = 1000;

#[derive(Debug, Deserialize)]
struct NeighborResponse {
    #[serde(default)]
    neighbors: Vec<RemoteNeighbor>,
    #[serde(default)]
    query: Option<Point>,
}

#[derive(Debug, Deserialize)]
struct RemoteNeighbor {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    distance: Option<f64>,
}

/// Decoded endpoint answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborList {
    pub neighbors: Vec<IdTuple>,
    pub query_point: Option<Point>,
}

/// Entries without an id, and the queried row itself, are dropped; the rest
/// keep their order up to `limit`.
pub fn parse_neighbor_response(body: &str, exclude: Option<&RowId>, limit: usize) -> Result<NeighborList> {
    let response: NeighborResponse =
        serde_json::from_str(body).map_err(|e| Error::Network(format!("malformed neighbor response: {e}")))?;
    let neighbors = response
        .neighbors
        .into_iter()
        .filter_map(|n| RowId::from_json(&n.id).map(|id| IdTuple::new(id, n.distance)))
        .filter(|t| exclude != Some(&t.id))
        .take(limit)
        .collect();
    Ok(NeighborList { neighbors, query_point: response.query.filter(|p| p.x.is_finite() && p.y.is_finite()) })
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint.trim()).map_err(|e| Error::InvalidConfig(format!("invalid endpoint '{endpoint}': {e}")))
}

async fn read_body(client: &Client, request: Request) -> Result<String> {
    let response = client.execute(request).await.map_err(Error::network)?;
    let response = response.error_for_status().map_err(Error::network)?;
    response.text().await.map_err(Error::network)
}

pub struct RemoteNeighbors {
    client: Client,
    endpoint: Url,
}

impl RemoteNeighbors {
    pub fn new(endpoint: &str) -> Result<Self> { Ok(Self { client: Client::new(), endpoint: parse_endpoint(endpoint)? }) }

    /// One extra neighbor is requested because the endpoint usually lists the
    /// queried row first.
    pub fn build_request(&self, id: &RowId, limit: usize) -> Result<Request> {
        let k = (limit + 1).min(REMOTE_K_CEILING);
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("id", &id.to_string()).append_pair("k", &k.to_string());
        self.client.get(url).build().map_err(Error::network)
    }

    pub async fn fetch(&self, id: &RowId, limit: usize) -> Result<NeighborList> {
        let body = read_body(&self.client, self.build_request(id, limit)?).await?;
        parse_neighbor_response(&body, Some(id), limit)
    }
}

#[async_trait]
impl NearestNeighbors for RemoteNeighbors {
    async fn nearest_neighbors(&self, id: &RowId, opts: &SearchOptions) -> Result<Vec<IdTuple>> {
        if opts.limit == 0 { return Ok(Vec::new()); }
        opts.report_status(Some("Fetching neighbors..."));
        let result = self.fetch(id, opts.limit).await;
        opts.report_status(None);
        match result {
            Ok(list) => {
                debug!(%id, found = list.neighbors.len(), "remote neighbors");
                Ok(list.neighbors)
            }
            Err(e) => {
                warn!(%id, endpoint = %self.endpoint, error = %e, "remote neighbor request failed");
                Ok(Vec::new())
            }
        }
    }
}

/// A file submitted for a neighbor lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait UploadNeighbors: Send + Sync {
    async fn upload_neighbors(&self, file: &UploadFile, opts: &SearchOptions) -> Result<NeighborList>;
}

pub struct UploadNeighborsClient {
    client: Client,
    endpoint: Url,
}

impl UploadNeighborsClient {
    pub fn new(endpoint: &str) -> Result<Self> { Ok(Self { client: Client::new(), endpoint: parse_endpoint(endpoint)? }) }

    pub fn build_request(&self, file: &UploadFile, k: usize) -> Result<Request> {
        let k = k.clamp(1, UPLOAD_K_CEILING);
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("k", &k.to_string());
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = multipart::Form::new().part("file", part);
        self.client.post(url).multipart(form).build().map_err(Error::network)
    }
}

#[async_trait]
impl UploadNeighbors for UploadNeighborsClient {
    async fn upload_neighbors(&self, file: &UploadFile, opts: &SearchOptions) -> Result<NeighborList> {
        if opts.limit == 0 { return Ok(NeighborList::default()); }
        opts.report_status(Some("Uploading file..."));
        let result = match self.build_request(file, opts.limit) {
            Ok(request) => read_body(&self.client, request).await,
            Err(e) => Err(e),
        };
        opts.report_status(None);
        match result.and_then(|body| parse_neighbor_response(&body, None, opts.limit.min(UPLOAD_K_CEILING))) {
            Ok(list) => {
                debug!(file = %file.name, found = list.neighbors.len(), "upload neighbors");
                Ok(list)
            }
            Err(e) => {
                warn!(file = %file.name, endpoint = %self.endpoint, error = %e, "upload neighbor request failed");
                Ok(NeighborList::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_neighbors_and_query_point() {
        let body = r#"{"neighbors": [{"id": 3, "distance": 0.0}, {"distance": 0.2}, {"id": 9, "distance": 0.4}, {"id": "x"}], "query": {"x": 1.5, "y": -2.0}}"#;
        let list = parse_neighbor_response(body, Some(&RowId::Int(3)), 10).expect("parse");
        assert_eq!(list.neighbors, vec![IdTuple::new(9, Some(0.4)), IdTuple::unscored("x")]);
        assert_eq!(list.query_point, Some(Point { x: 1.5, y: -2.0 }));
    }

    #[test]
    fn clamps_to_limit_and_tolerates_missing_fields() {
        let body = r#"{"neighbors": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;
        let list = parse_neighbor_response(body, None, 2).expect("parse");
        assert_eq!(list.neighbors.len(), 2);
        assert_eq!(list.query_point, None);
        assert!(parse_neighbor_response("{}", None, 2).expect("parse").neighbors.is_empty());
        assert!(parse_neighbor_response("<html>", None, 2).is_err());
    }

    #[test]
    fn neighbor_request_asks_for_one_extra_row() {
        let remote = RemoteNeighbors::new("http://localhost:8000/neighbors?dataset=skin").expect("endpoint");
        let request = remote.build_request(&RowId::Int(42), 16).expect("request");
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().as_str(), "http://localhost:8000/neighbors?dataset=skin&id=42&k=17");

        let capped = remote.build_request(&RowId::from("a b"), 800).expect("request");
        assert_eq!(capped.url().query(), Some("dataset=skin&id=a+b&k=500"));
    }

    #[test]
    fn upload_request_is_multipart_with_clamped_k() {
        let client = UploadNeighborsClient::new("http://localhost:8000/upload").expect("endpoint");
        let file = UploadFile { name: "lesion.png".to_string(), bytes: vec![1, 2, 3] };
        let request = client.build_request(&file, 5000).expect("request");
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().query(), Some("k=1000"));
        let content_type = request
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("multipart/form-data"));
        assert!(RemoteNeighbors::new("not a url").is_err());
    }
}

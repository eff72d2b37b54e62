//! Client for the pages persistence API.
//!
//! Every endpoint answers with a `{success, data?, message?}` envelope. A
//! successful page response carries the full page under `data.page`.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::document::{Block, CollaboratorRole, Page, PageCategory, PageSettings};

/// Errors returned by the pages API client
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    page: Option<Page>,
}

#[derive(Debug, Deserialize)]
struct PagesData {
    #[serde(default)]
    pages: Vec<Page>,
}

/// Filters for `list_pages`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PageCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PageCategory>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<PageSettings>,
}

impl NewPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial page update; unset fields are left alone by the server
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<PageSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PageCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

#[derive(Serialize)]
struct BlocksBody<'a> {
    blocks: &'a [Block],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollaboratorBody<'a> {
    user_id: &'a str,
    role: CollaboratorRole,
}

/// Pages API client
#[derive(Debug, Clone)]
pub struct PagesApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PagesApi {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_pages(&self, query: &PageQuery) -> ApiResult<Vec<Page>> {
        let data: Option<PagesData> = self
            .send(self.request(Method::GET, "/pages").query(query))
            .await?;
        Ok(data.map(|d| d.pages).unwrap_or_default())
    }

    pub async fn get_page(&self, page_id: &str) -> ApiResult<Page> {
        let path = format!("/pages/{}", page_id);
        self.send_for_page(self.request(Method::GET, &path)).await
    }

    pub async fn create_page(&self, page: &NewPage) -> ApiResult<Page> {
        self.send_for_page(self.request(Method::POST, "/pages").json(page))
            .await
    }

    pub async fn update_page(&self, page_id: &str, update: &PageUpdate) -> ApiResult<Page> {
        let path = format!("/pages/{}", page_id);
        self.send_for_page(self.request(Method::PUT, &path).json(update))
            .await
    }

    /// Replace the whole block collection of a page
    pub async fn update_blocks(&self, page_id: &str, blocks: &[Block]) -> ApiResult<Page> {
        let path = format!("/pages/{}/blocks", page_id);
        self.send_for_page(self.request(Method::PUT, &path).json(&BlocksBody { blocks }))
            .await
    }

    pub async fn delete_page(&self, page_id: &str) -> ApiResult<()> {
        let path = format!("/pages/{}", page_id);
        let _: Option<serde_json::Value> = self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    pub async fn publish_page(&self, page_id: &str) -> ApiResult<Page> {
        let update = PageUpdate {
            is_published: Some(true),
            ..Default::default()
        };
        self.update_page(page_id, &update).await
    }

    pub async fn unpublish_page(&self, page_id: &str) -> ApiResult<Page> {
        let update = PageUpdate {
            is_published: Some(false),
            ..Default::default()
        };
        self.update_page(page_id, &update).await
    }

    pub async fn add_collaborator(
        &self,
        page_id: &str,
        user_id: &str,
        role: CollaboratorRole,
    ) -> ApiResult<Page> {
        let path = format!("/pages/{}/collaborators", page_id);
        let body = CollaboratorBody { user_id, role };
        self.send_for_page(self.request(Method::POST, &path).json(&body))
            .await
    }

    pub async fn remove_collaborator(&self, page_id: &str, user_id: &str) -> ApiResult<Page> {
        let path = format!("/pages/{}/collaborators/{}", page_id, user_id);
        self.send_for_page(self.request(Method::DELETE, &path)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_for_page(&self, request: RequestBuilder) -> ApiResult<Page> {
        let data: Option<PageData> = self.send(request).await?;
        data.and_then(|d| d.page)
            .ok_or_else(|| ApiError::Rejected("Response did not include a page".to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Pages API rejected the credential");
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Undecodable API response: {}", e);
                return Err(ApiError::UnexpectedResponse {
                    status: status.as_u16(),
                    body,
                });
            }
        };

        if !envelope.success || !status.is_success() {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("Request failed with status {}", status));
            return Err(ApiError::Rejected(message));
        }

        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BlockType, UserSummary};
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, post, put};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    const TOKEN: &str = "good-token";

    type Pages = Arc<Mutex<HashMap<String, Page>>>;
    type Reply = (StatusCode, Json<Value>);

    fn authorized(headers: &HeaderMap) -> Result<(), Reply> {
        let expected = format!("Bearer {}", TOKEN);
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "Not authorized" })),
            )),
        }
    }

    fn page_reply(page: &Page) -> Reply {
        (StatusCode::OK, Json(json!({ "success": true, "data": { "page": page } })))
    }

    fn not_found() -> Reply {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Page not found" })),
        )
    }

    fn with_page(pages: &Pages, id: &str, f: impl FnOnce(&mut Page)) -> Reply {
        match pages.lock().get_mut(id) {
            Some(page) => {
                f(page);
                page_reply(page)
            }
            None => not_found(),
        }
    }

    async fn list_pages(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        let published = query.get("isPublished").map(|v| v == "true");
        let list: Vec<Page> = pages
            .lock()
            .values()
            .filter(|p| published.map_or(true, |want| p.is_published == want))
            .cloned()
            .collect();
        (StatusCode::OK, Json(json!({ "success": true, "data": { "pages": list } })))
    }

    async fn create_page(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        let id = format!("page-{}", pages.lock().len() + 1);
        let page = Page::new(id.clone(), body["title"].as_str().unwrap_or_default());
        pages.lock().insert(id, page.clone());
        page_reply(&page)
    }

    async fn get_page(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        with_page(&pages, &id, |_| {})
    }

    async fn update_page(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        with_page(&pages, &id, |page| {
            if let Some(title) = body["title"].as_str() {
                page.title = title.to_string();
            }
            if let Some(published) = body["isPublished"].as_bool() {
                page.is_published = published;
            }
            page.version += 1;
        })
    }

    async fn update_blocks(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        let blocks: Vec<Block> = match serde_json::from_value(body["blocks"].clone()) {
            Ok(blocks) => blocks,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "success": false, "message": "Invalid blocks" })),
                )
            }
        };
        with_page(&pages, &id, |page| {
            page.blocks = blocks;
            page.version += 1;
        })
    }

    async fn delete_page(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        match pages.lock().remove(&id) {
            Some(_) => (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Page deleted" })),
            ),
            None => not_found(),
        }
    }

    async fn add_collaborator(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        let user_id = body["userId"].as_str().unwrap_or_default().to_string();
        let role: CollaboratorRole =
            serde_json::from_value(body["role"].clone()).unwrap_or_default();
        with_page(&pages, &id, |page| {
            page.collaborators.push(crate::document::Collaborator {
                user: UserSummary::new(user_id, ""),
                role,
                added_at: None,
            });
        })
    }

    async fn remove_collaborator(
        State(pages): State<Pages>,
        headers: HeaderMap,
        Path((id, user_id)): Path<(String, String)>,
    ) -> Reply {
        if let Err(reply) = authorized(&headers) {
            return reply;
        }
        with_page(&pages, &id, |page| {
            page.collaborators.retain(|c| c.user.id != user_id);
        })
    }

    async fn mock_server() -> (String, Pages) {
        let pages: Pages = Arc::new(Mutex::new(HashMap::new()));
        pages
            .lock()
            .insert("p1".into(), Page::new("p1", "Landing"));

        let app = Router::new()
            .route("/api/pages", get(list_pages).post(create_page))
            .route(
                "/api/pages/:id",
                get(get_page).put(update_page).delete(delete_page),
            )
            .route("/api/pages/:id/blocks", put(update_blocks))
            .route("/api/pages/:id/collaborators", post(add_collaborator))
            .route(
                "/api/pages/:id/collaborators/:user_id",
                delete(remove_collaborator),
            )
            .with_state(pages.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/api", addr), pages)
    }

    fn client(base_url: &str) -> PagesApi {
        PagesApi::new(base_url, Duration::from_secs(5))
            .unwrap()
            .with_token(TOKEN)
    }

    #[tokio::test]
    async fn test_get_page() {
        let (url, _) = mock_server().await;
        let page = client(&url).get_page("p1").await.unwrap();
        assert_eq!(page.id, "p1");
        assert_eq!(page.title, "Landing");
    }

    #[tokio::test]
    async fn test_missing_page_is_rejected_with_message() {
        let (url, _) = mock_server().await;
        match client(&url).get_page("nope").await {
            Err(ApiError::Rejected(message)) => assert_eq!(message, "Page not found"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let (url, _) = mock_server().await;
        let api = PagesApi::new(&url, Duration::from_secs(5))
            .unwrap()
            .with_token("stale");
        assert!(matches!(api.get_page("p1").await, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_create_and_list_pages() {
        let (url, _) = mock_server().await;
        let api = client(&url);

        let created = api.create_page(&NewPage::new("Portfolio")).await.unwrap();
        assert_eq!(created.title, "Portfolio");

        let all = api.list_pages(&PageQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let published = api
            .list_pages(&PageQuery {
                is_published: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(published.is_empty());
    }

    #[tokio::test]
    async fn test_update_blocks_replaces_collection() {
        let (url, pages) = mock_server().await;
        let blocks = vec![
            Block::with_id("b1", BlockType::Text),
            Block::with_id("b2", BlockType::Divider).with_order(1.0),
        ];

        let page = client(&url).update_blocks("p1", &blocks).await.unwrap();
        assert_eq!(page.blocks, blocks);
        assert_eq!(page.version, 1);
        assert_eq!(pages.lock()["p1"].blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_round_trip() {
        let (url, _) = mock_server().await;
        let api = client(&url);

        assert!(api.publish_page("p1").await.unwrap().is_published);
        assert!(!api.unpublish_page("p1").await.unwrap().is_published);

        let renamed = api
            .update_page(
                "p1",
                &PageUpdate {
                    title: Some("Home".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Home");
        assert!(!renamed.is_published);
    }

    #[tokio::test]
    async fn test_collaborators() {
        let (url, _) = mock_server().await;
        let api = client(&url);

        let page = api
            .add_collaborator("p1", "user-2", CollaboratorRole::Viewer)
            .await
            .unwrap();
        assert!(page.is_member("user-2"));
        assert_eq!(page.collaborators[0].role, CollaboratorRole::Viewer);

        let page = api.remove_collaborator("p1", "user-2").await.unwrap();
        assert!(!page.is_member("user-2"));
    }

    #[tokio::test]
    async fn test_delete_page() {
        let (url, pages) = mock_server().await;
        let api = client(&url);

        api.delete_page("p1").await.unwrap();
        assert!(pages.lock().is_empty());
        assert!(matches!(api.delete_page("p1").await, Err(ApiError::Rejected(_))));
    }
}

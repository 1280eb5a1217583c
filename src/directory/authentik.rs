use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{DirectoryError, DirectoryService, DirectoryUser};
use crate::config::DirectoryConfig;

/// Upper bound on pages fetched for one listing
const MAX_PAGES: u32 = 100;

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: u32,
}

#[derive(Debug, Deserialize)]
struct UserPage {
    pagination: Pagination,
    results: Vec<DirectoryUser>,
}

/// Client for `/api/v3/core/users/`.
pub struct AuthentikClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl AuthentikClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        if config.base_url.is_empty() || config.api_token.is_empty() {
            return Err(DirectoryError::NotConfigured(
                "missing base_url or api_token".to_string(),
            ));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn users_url(&self) -> String {
        format!("{}/api/v3/core/users/", self.base_url)
    }

    async fn fetch_page(&self, page: u32) -> Result<UserPage, DirectoryError> {
        let response = self
            .http
            .get(self.users_url())
            .query(&[("page", page)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DirectoryService for AuthentikClient {
    #[tracing::instrument(name = "directory.list_users", skip(self))]
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let mut users = Vec::new();
        let mut page = 1;

        loop {
            let result = self.fetch_page(page).await?;
            users.extend(
                result
                    .results
                    .into_iter()
                    .filter(|user| !user.is_service_account()),
            );

            let next = result.pagination.next;
            if next == 0 || next <= page || page >= MAX_PAGES {
                break;
            }
            page = next;
        }

        tracing::debug!(count = users.len(), "Fetched directory users");
        Ok(users)
    }

    #[tracing::instrument(name = "directory.get_user", skip(self))]
    async fn get_user(&self, pk: i64) -> Result<DirectoryUser, DirectoryError> {
        let response = self
            .http
            .get(format!("{}{}/", self.users_url(), pk))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(pk)),
            status => Err(DirectoryError::Status {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(pk: i64, username: &str, user_type: &str) -> serde_json::Value {
        json!({
            "pk": pk,
            "username": username,
            "name": username.to_uppercase(),
            "email": format!("{}@example.com", username),
            "is_active": true,
            "type": user_type,
        })
    }

    async fn client(server: &MockServer) -> AuthentikClient {
        AuthentikClient::new(&DirectoryConfig {
            base_url: server.uri(),
            api_token: "token".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_users_filters_service_accounts_across_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/core/users/"))
            .and(query_param("page", "1"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pagination": {"next": 2, "current": 1},
                "results": [user(1, "hong", "internal"), user(2, "outpost", "internal_service_account")]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v3/core/users/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pagination": {"next": 0, "current": 2},
                "results": [user(3, "kim", "external")]
            })))
            .mount(&server)
            .await;

        let users = client(&server).await.list_users().await.unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["hong", "kim"]);
        assert_eq!(users[0].email, "hong@example.com");
    }

    #[tokio::test]
    async fn test_list_users_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server).await.list_users().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status { status: 403 }));
    }

    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/core/users/7/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user(7, "lee", "internal")))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.get_user(7).await.unwrap().username, "lee");
        assert!(matches!(
            client.get_user(8).await,
            Err(DirectoryError::NotFound(8))
        ));
    }

    #[test]
    fn test_requires_configuration() {
        assert!(AuthentikClient::new(&DirectoryConfig::default()).is_err());
    }
}

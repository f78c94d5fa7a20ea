//! Microsoft Graph client for OneDrive for Business
//!
//! App-only access: a client-credentials token grant, then every drive call
//! goes through `/users/{id}/drive` of the configured user.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::errors::GraphError;
use super::types::{ChildrenPage, DriveItem, TokenResponse, UserResource};

const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Clone)]
struct GraphSession {
    access_token: String,
    user_id: String,
}

pub struct OneDriveClient {
    http_client: Client,
    login_base: String,
    graph_base: String,
    session: RwLock<Option<GraphSession>>,
}

impl OneDriveClient {
    pub fn new(http_client: Client) -> Self {
        Self::with_endpoints(http_client, LOGIN_BASE, GRAPH_BASE)
    }

    pub fn with_endpoints(
        http_client: Client,
        login_base: impl Into<String>,
        graph_base: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            login_base: login_base.into(),
            graph_base: graph_base.into(),
            session: RwLock::new(None),
        }
    }

    fn session(&self) -> Result<GraphSession, GraphError> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(GraphError::NotAuthorized)
    }

    /// Obtain an app token and resolve the drive owner.
    ///
    /// Replaces any previous session.
    pub async fn authorize(
        &self,
        client_id: &str,
        client_secret: &str,
        tenant_id: &str,
        user: &str,
    ) -> Result<(), GraphError> {
        info!(tenant = tenant_id, user = user, "Requesting Microsoft Graph token...");

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, tenant_id);
        let response = self
            .http_client
            .post(&url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(GraphError::Unauthorized(format!("token request failed ({})", status)));
        }
        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Microsoft Graph token issued");

        let url = format!("{}/users/{}", self.graph_base, user);
        let owner: UserResource = self.get_json(&url, &token.access_token).await?;

        info!(user = user, user_id = %owner.id, "OneDrive client ready");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(GraphSession {
            access_token: token.access_token,
            user_id: owner.id,
        });
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, GraphError> {
        let response = self.http_client.get(url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::from_status(status, &body));
        }
        Ok(response.json().await?)
    }

    /// Children of a folder (`None` for the drive root), all pages
    pub async fn list_children(&self, folder_id: Option<&str>) -> Result<Vec<DriveItem>, GraphError> {
        let session = self.session()?;
        let mut url = match folder_id {
            Some(id) => format!(
                "{}/users/{}/drive/items/{}/children",
                self.graph_base, session.user_id, id
            ),
            None => format!("{}/users/{}/drive/root/children", self.graph_base, session.user_id),
        };

        let mut items = Vec::new();
        loop {
            let page: ChildrenPage = self.get_json(&url, &session.access_token).await?;
            items.extend(page.value);
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(items)
    }

    /// Every file below the drive root, folders expanded depth-first
    pub async fn list_files_recursive(&self) -> Result<Vec<DriveItem>, GraphError> {
        let mut files = Vec::new();
        let mut pending: Vec<Option<String>> = vec![None];

        while let Some(folder) = pending.pop() {
            let children = self.list_children(folder.as_deref()).await?;
            debug!(folder = ?folder, count = children.len(), "Listed OneDrive folder");
            for child in children {
                if child.is_folder() {
                    pending.push(Some(child.id));
                } else if child.file.is_some() {
                    files.push(child);
                }
            }
        }
        Ok(files)
    }

    pub async fn get_item(&self, item_id: &str) -> Result<DriveItem, GraphError> {
        let session = self.session()?;
        let url = format!(
            "{}/users/{}/drive/items/{}",
            self.graph_base, session.user_id, item_id
        );
        self.get_json(&url, &session.access_token).await
    }
}

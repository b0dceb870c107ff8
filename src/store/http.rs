use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::RouteStore;
use crate::types::route::{NewRoute, Route, RouteUpdate};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedRoute {
    pub id: i64,
}

/// [`RouteStore`] backed by the trilhos HTTP API.
///
/// Ownership scoping happens on the server, derived from the bearer token;
/// the `owner` / `user_id` arguments of the trait are therefore implied by
/// the token this client was built with.
#[derive(Clone)]
pub struct HttpRouteStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRouteStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self.authorized(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|err| StoreError::Unavailable(format!("Invalid route store response: {}", err)))
    }
}

fn not_found_as(id: i64, err: StoreError) -> StoreError {
    match err {
        StoreError::Rejected { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            StoreError::NotFound(id)
        }
        other => other,
    }
}

impl RouteStore for HttpRouteStore {
    async fn insert(&self, route: NewRoute) -> Result<i64, StoreError> {
        let created: CreatedRoute = self
            .json(self.client.post(self.url("/api/routes")).json(&route))
            .await?;
        Ok(created.id)
    }

    async fn update(&self, id: i64, _owner: Option<Uuid>, update: RouteUpdate) -> Result<Route, StoreError> {
        self.json(
            self.client
                .patch(self.url(&format!("/api/routes/{}", id)))
                .json(&update),
        )
        .await
        .map_err(|err| not_found_as(id, err))
    }

    async fn delete(&self, id: i64, _owner: Option<Uuid>) -> Result<(), StoreError> {
        self.send(self.client.delete(self.url(&format!("/api/routes/{}", id))))
            .await
            .map(|_| ())
            .map_err(|err| not_found_as(id, err))
    }

    async fn find_active_for_user(&self, _user_id: Option<Uuid>) -> Result<Option<Route>, StoreError> {
        self.json(self.client.get(self.url("/api/active-route"))).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Route>, StoreError> {
        match self
            .json::<Route>(self.client.get(self.url(&format!("/api/routes/{}", id))))
            .await
            .map_err(|err| not_found_as(id, err))
        {
            Ok(route) => Ok(Some(route)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn find_completed_for_user(&self, _user_id: Uuid) -> Result<Vec<Route>, StoreError> {
        self.json(self.client.get(self.url("/api/history"))).await
    }

    async fn find_all_completed(&self) -> Result<Vec<Route>, StoreError> {
        self.json(self.client.get(self.url("/api/activity"))).await
    }
}

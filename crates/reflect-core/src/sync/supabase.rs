//! Supabase backend over HTTP.
//!
//! Tables are reached through PostgREST (`/rest/v1/{table}`), auth through
//! GoTrue (`/auth/v1`), and push delivery through the `send_push` edge
//! function. Every request carries the project's public `apikey` and a
//! bearer token: the user's access token when signed in, the anon key
//! otherwise.

use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::notify::{NotificationPrefs, PushDelivery, PushMessage, PushSubscription};
use crate::sync::backend::{AuthSession, GoalRow, LogRow, RemoteBackend};
use crate::sync::types::{Collection, SyncError};

/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

const ON_CONFLICT_ROW: &str = "id,user_id";
const ON_CONFLICT_USER: &str = "user_id";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
}

impl From<TokenResponse> for AuthSession {
    fn from(t: TokenResponse) -> Self {
        AuthSession {
            user_id: t.user.id,
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at: t.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrefsRow {
    #[serde(default)]
    morning_enabled: Option<bool>,
    #[serde(default)]
    evening_enabled: Option<bool>,
}

/// Supabase project client.
pub struct SupabaseBackend {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
}

impl std::fmt::Debug for SupabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseBackend")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl SupabaseBackend {
    /// Create a client for the project at `url`.
    ///
    /// # Errors
    /// Returns an error if `url` is not a valid absolute URL.
    pub fn new(url: &str, anon_key: impl Into<String>) -> Result<Self, SyncError> {
        let mut base = Url::parse(url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            anon_key: anon_key.into(),
            session: RwLock::new(None),
        })
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<AuthSession>> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_session(&self, session: Option<AuthSession>) {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = session;
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.base.join(path)?)
    }

    fn request(&self, method: Method, url: Url, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn table(&self, method: Method, table: &str, bearer: &str) -> Result<RequestBuilder, SyncError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        Ok(self.request(method, url, bearer))
    }

    /// Access token of the current session, refreshed when close to expiry.
    async fn access_token(&self) -> Result<String, SyncError> {
        let current = self.read_session().clone();
        let session = current.ok_or(SyncError::AuthenticationRequired)?;

        if !session.expires_within(Utc::now(), REFRESH_MARGIN_SECS) {
            return Ok(session.access_token);
        }
        let Some(refresh_token) = session.refresh_token.clone() else {
            return Ok(session.access_token);
        };

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let response = self
            .request(Method::POST, url, &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let refreshed: AuthSession = decode::<TokenResponse>(response).await?.into();
        tracing::debug!(user_id = %refreshed.user_id, "access token refreshed");
        self.set_session(Some(refreshed.clone()));
        Ok(refreshed.access_token)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        user_id: &str,
        order: &str,
    ) -> Result<Vec<T>, SyncError> {
        let token = self.access_token().await?;
        let response = self
            .table(Method::GET, table, &token)?
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "*".to_string()),
                ("order", order.to_string()),
            ])
            .send()
            .await?;
        decode(response).await
    }

    async fn upsert<T: serde::Serialize + Sync>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &T,
    ) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        let response = self
            .table(Method::POST, table, &token)?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn delete_where_user(&self, table: &str, user_id: &str) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        let response = self
            .table(Method::DELETE, table, &token)?
            .query(&[("user_id", format!("eq.{user_id}"))])
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// Register through the `upsert_subscription` edge function.
    async fn upsert_subscription_via_function(
        &self,
        subscription: &PushSubscription,
        prefs: NotificationPrefs,
        token: &str,
    ) -> Result<(), SyncError> {
        let url = self.endpoint("functions/v1/upsert_subscription")?;
        let response = self
            .request(Method::POST, url, token)
            .json(&json!({
                "endpoint": subscription.endpoint,
                "keys": subscription.keys,
                "timezone": subscription.timezone,
                "morning_enabled": prefs.morning,
                "evening_enabled": prefs.evening,
            }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }
}

/// Turn a non-success response into [`SyncError::Status`].
async fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl RemoteBackend for SupabaseBackend {
    fn session(&self) -> Option<AuthSession> {
        self.read_session().clone()
    }

    fn restore_session(&self, session: AuthSession) {
        self.set_session(Some(session));
    }

    async fn sign_in_anonymously(&self, device_id: &str) -> Result<AuthSession, SyncError> {
        let url = self.endpoint("auth/v1/signup")?;
        let response = self
            .request(Method::POST, url, &self.anon_key)
            .json(&json!({ "data": { "device_id": device_id } }))
            .send()
            .await?;
        let session: AuthSession = decode::<TokenResponse>(response).await?.into();
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn select_goals(&self, user_id: &str) -> Result<Vec<GoalRow>, SyncError> {
        self.select("goals", user_id, "created_at.asc").await
    }

    async fn select_logs(&self, user_id: &str) -> Result<Vec<LogRow>, SyncError> {
        self.select("logs", user_id, "date.desc").await
    }

    async fn upsert_goals(&self, rows: &[GoalRow]) -> Result<(), SyncError> {
        self.upsert("goals", ON_CONFLICT_ROW, &rows).await
    }

    async fn upsert_logs(&self, rows: &[LogRow]) -> Result<(), SyncError> {
        self.upsert("logs", ON_CONFLICT_ROW, &rows).await
    }

    async fn delete_for_user(&self, collection: Collection, user_id: &str) -> Result<(), SyncError> {
        self.delete_where_user(collection.name(), user_id).await
    }

    async fn get_prefs(&self, user_id: &str) -> Result<Option<NotificationPrefs>, SyncError> {
        let token = self.access_token().await?;
        let response = self
            .table(Method::GET, "push_subscriptions", &token)?
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "morning_enabled,evening_enabled".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<PrefsRow> = decode(response).await?;
        Ok(rows.into_iter().next().map(|row| NotificationPrefs {
            morning: row.morning_enabled.unwrap_or(false),
            evening: row.evening_enabled.unwrap_or(false),
        }))
    }

    async fn update_prefs(&self, user_id: &str, prefs: NotificationPrefs) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        let response = self
            .table(Method::PATCH, "push_subscriptions", &token)?
            .query(&[("user_id", format!("eq.{user_id}"))])
            .json(&json!({
                "morning_enabled": prefs.morning,
                "evening_enabled": prefs.evening,
                "updated_at": Utc::now(),
            }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        subscription: &PushSubscription,
        prefs: NotificationPrefs,
    ) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        match self
            .upsert_subscription_via_function(subscription, prefs, &token)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "upsert_subscription function unavailable, writing row directly");
            }
        }

        let row = json!({
            "user_id": user_id,
            "endpoint": subscription.endpoint,
            "p256dh_key": subscription.keys.p256dh,
            "auth_key": subscription.keys.auth,
            "timezone": subscription.timezone,
            "morning_enabled": prefs.morning,
            "evening_enabled": prefs.evening,
            "updated_at": Utc::now(),
        });
        self.upsert("push_subscriptions", ON_CONFLICT_USER, &row).await
    }

    async fn delete_subscription(&self, user_id: &str) -> Result<(), SyncError> {
        self.delete_where_user("push_subscriptions", user_id).await
    }
}

#[async_trait]
impl PushDelivery for SupabaseBackend {
    async fn deliver(&self, user_id: &str, message: &PushMessage) -> Result<(), SyncError> {
        let token = self.access_token().await?;
        let url = self.endpoint("functions/v1/send_push")?;
        let response = self
            .request(Method::POST, url, &token)
            .json(&json!({ "subscription_id": user_id, "payload": message }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::PushKeys;
    use mockito::Matcher;

    fn signed_in(server: &mockito::ServerGuard) -> SupabaseBackend {
        let backend = SupabaseBackend::new(&server.url(), "anon-key").unwrap();
        backend.restore_session(AuthSession {
            user_id: "user-1".into(),
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        });
        backend
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            SupabaseBackend::new("not a url", "k"),
            Err(SyncError::Url(_))
        ));
    }

    #[tokio::test]
    async fn anonymous_sign_in_stores_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/signup")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .match_body(Matcher::PartialJson(
                json!({ "data": { "device_id": "reflect-abc" } }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"tok","refresh_token":"ref","expires_in":3600,"user":{"id":"anon-7"}}"#,
            )
            .create_async()
            .await;

        let backend = SupabaseBackend::new(&server.url(), "anon-key").unwrap();
        let session = backend.sign_in_anonymously("reflect-abc").await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.user_id, "anon-7");
        assert_eq!(backend.user_id().as_deref(), Some("anon-7"));
        assert!(session.expires_at.is_some());
    }

    #[tokio::test]
    async fn select_goals_filters_by_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/goals")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()),
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("order".into(), "created_at.asc".into()),
            ]))
            .match_header("authorization", "Bearer access-1")
            .with_status(200)
            .with_body(
                r#"[{"id":"g1","user_id":"user-1","name":"Run","quarter":"Q1-2025",
                     "objectives":[{"id":"o1","text":"5k","difficulty":"hard","completed":true}],
                     "created_at":"2025-01-02T10:00:00Z","updated_at":null}]"#,
            )
            .create_async()
            .await;

        let rows = signed_in(&server).select_goals("user-1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].objectives[0].text, "5k");
    }

    #[tokio::test]
    async fn upsert_logs_uses_composite_conflict_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/logs")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "id,user_id".into()))
            .match_header("prefer", Matcher::Regex("resolution=merge-duplicates".into()))
            .match_body(Matcher::PartialJson(json!([{ "id": "l1", "objective_id": "o1" }])))
            .with_status(201)
            .create_async()
            .await;

        let row = LogRow {
            id: "l1".into(),
            user_id: "user-1".into(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            goal_id: Some("g1".into()),
            objective_id: Some("o1".into()),
            intention: Some("Run 5k".into()),
            reflection: None,
            status: None,
            closed: None,
            created_at: None,
            updated_at: None,
        };
        signed_in(&server).upsert_logs(&[row]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/logs")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("JWT expired")
            .create_async()
            .await;

        let err = signed_in(&server).select_logs("user-1").await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 401, ref body } if body == "JWT expired"));
    }

    #[tokio::test]
    async fn requests_without_session_need_auth() {
        let server = mockito::Server::new_async().await;
        let backend = SupabaseBackend::new(&server.url(), "anon-key").unwrap();
        assert!(matches!(
            backend.select_goals("user-1").await,
            Err(SyncError::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_first() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .match_body(Matcher::PartialJson(json!({ "refresh_token": "refresh-1" })))
            .with_status(200)
            .with_body(r#"{"access_token":"access-2","refresh_token":"refresh-2","expires_in":3600,"user":{"id":"user-1"}}"#)
            .create_async()
            .await;
        let select = server
            .mock("GET", "/rest/v1/goals")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer access-2")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let backend = SupabaseBackend::new(&server.url(), "anon-key").unwrap();
        backend.restore_session(AuthSession {
            user_id: "user-1".into(),
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        });

        assert!(backend.select_goals("user-1").await.unwrap().is_empty());
        refresh.assert_async().await;
        select.assert_async().await;
        assert_eq!(backend.session().unwrap().access_token, "access-2");
    }

    #[tokio::test]
    async fn prefs_read_first_row_or_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/push_subscriptions")
            .match_query(Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()))
            .with_status(200)
            .with_body(r#"[{"morning_enabled":true,"evening_enabled":null}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/push_subscriptions")
            .match_query(Matcher::UrlEncoded("user_id".into(), "eq.user-2".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let backend = signed_in(&server);
        assert_eq!(
            backend.get_prefs("user-1").await.unwrap(),
            Some(NotificationPrefs {
                morning: true,
                evening: false
            })
        );
        assert_eq!(backend.get_prefs("user-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_falls_back_to_table_upsert() {
        let mut server = mockito::Server::new_async().await;
        let function = server
            .mock("POST", "/functions/v1/upsert_subscription")
            .with_status(404)
            .create_async()
            .await;
        let table = server
            .mock("POST", "/rest/v1/push_subscriptions")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "user_id".into()))
            .match_body(Matcher::PartialJson(json!({
                "user_id": "user-1",
                "p256dh_key": "pk",
                "auth_key": "ak",
                "morning_enabled": true,
            })))
            .with_status(201)
            .create_async()
            .await;

        let subscription = PushSubscription {
            endpoint: "https://push.example.com/e".into(),
            keys: PushKeys {
                p256dh: "pk".into(),
                auth: "ak".into(),
            },
            timezone: "UTC".into(),
        };
        signed_in(&server)
            .upsert_subscription(
                "user-1",
                &subscription,
                NotificationPrefs {
                    morning: true,
                    evening: false,
                },
            )
            .await
            .unwrap();
        function.assert_async().await;
        table.assert_async().await;
    }

    #[tokio::test]
    async fn deliver_posts_to_send_push() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/send_push")
            .match_body(Matcher::PartialJson(json!({
                "subscription_id": "user-1",
                "payload": { "tag": "test-notification" }
            })))
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        signed_in(&server)
            .deliver("user-1", &PushMessage::test())
            .await
            .unwrap();
        mock.assert_async().await;
    }
}

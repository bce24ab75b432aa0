//! Client for the hosted platform's auth and object-storage REST APIs.

use crate::{auth::AuthUser, config::Config};
use anyhow::Context;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const CLUB_IMAGES_BUCKET: &str = "club_images";
pub const EVENT_IMAGES_BUCKET: &str = "event_images";

#[derive(Debug, Error)]
#[error("{message} ({status})")]
pub struct BackendError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Sign-up answers with a session when e-mail confirmation is off and with
/// the bare user when it is on.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    Session(Session),
    PendingConfirmation(AuthUser),
}

impl SignUpOutcome {
    pub fn user(&self) -> &AuthUser {
        match self {
            SignUpOutcome::Session(session) => &session.user,
            SignUpOutcome::PendingConfirmation(user) => user,
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base: Url,
    anon_key: String,
}

impl BackendClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> anyhow::Result<BackendClient> {
        let mut base = Url::parse(base_url).context("BACKEND_URL is not a valid url")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(BackendClient {
            http: Client::new(),
            base,
            anon_key: anon_key.into(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<BackendClient> {
        BackendClient::new(&config.backend_url, config.backend_anon_key.clone())
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid backend path {path}"))
    }

    async fn check(res: Response) -> anyhow::Result<Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        // auth and storage disagree on where the text goes
        #[derive(Deserialize)]
        struct ErrorBody {
            error_description: Option<String>,
            msg: Option<String>,
            message: Option<String>,
            error: Option<String>,
        }

        let message = res
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error_description.or(b.msg).or(b.message).or(b.error))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(BackendError { status, message }.into())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let res = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<SignUpOutcome> {
        let res = self
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct Recover<'a> {
            email: &'a str,
        }

        let res = self
            .http
            .post(self.endpoint("auth/v1/recover")?)
            .header("apikey", &self.anon_key)
            .json(&Recover { email })
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    pub async fn current_user(&self, access_token: &str) -> anyhow::Result<AuthUser> {
        let res = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn upload(
        &self,
        access_token: &str,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.endpoint(&format!("storage/v1/object/{bucket}/{path}"))?)
            .header("apikey", &self.anon_key)
            .header(header::CONTENT_TYPE, content_type)
            .bearer_auth(access_token)
            .body(bytes)
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> anyhow::Result<Url> {
        self.endpoint(&format!("storage/v1/object/public/{bucket}/{path}"))
    }
}

/// Maps a hosted-service error onto the status a caller should see;
/// anything else stays an internal error.
pub fn client_status(err: &anyhow::Error) -> Option<(axum::http::StatusCode, String)> {
    let backend = err.downcast_ref::<BackendError>()?;
    let status = match backend.status.as_u16() {
        400 | 422 => axum::http::StatusCode::BAD_REQUEST,
        401 | 403 => axum::http::StatusCode::UNAUTHORIZED,
        404 => axum::http::StatusCode::NOT_FOUND,
        409 => axum::http::StatusCode::CONFLICT,
        429 => axum::http::StatusCode::TOO_MANY_REQUESTS,
        _ => return None,
    };
    Some((status, backend.message.clone()))
}

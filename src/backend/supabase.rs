//! Supabase project client: GoTrue for sessions, PostgREST for rows.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use super::{session_file::SessionFile, AuthProvider, RemoteError, RemoteResult, TodoTable};
use crate::{
    config::Config,
    entities::{
        session::{Session, User},
        todo::{NewTodo, Todo, TodoId, TodoPatch},
    },
};

/// Asks PostgREST for a bare object instead of a one-element array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    table: String,
    authorize_url: Url,
    session: RwLock<Option<Session>>,
    session_file: SessionFile,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> RemoteResult<Self> {
        let base = config
            .base_url()
            .map_err(|err| RemoteError::new(err.to_string()))?;
        let mut authorize_url = join(&base, "auth/v1/authorize")?;
        authorize_url
            .query_pairs_mut()
            .append_pair("provider", &config.provider)
            .append_pair("redirect_to", &config.redirect_to);
        let http = reqwest::Client::builder()
            .user_agent(concat!("lazytodo/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
            authorize_url,
            session: RwLock::new(None),
            session_file: SessionFile::new(&config.session_file),
        })
    }

    fn current_session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }

    fn set_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.session.write() {
            *guard = session;
        }
    }

    /// Row-level security needs the user's token; the anon key stands in otherwise.
    fn bearer(&self) -> String {
        self.current_session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RemoteResult<RequestBuilder> {
        let url = join(&self.base, path)?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }

    fn rows(&self, method: Method) -> RemoteResult<RequestBuilder> {
        let path = format!("rest/v1/{}", self.table);
        self.request(method, &path, &self.bearer())
    }

    async fn fetch_user(&self, token: &str) -> RemoteResult<User> {
        let response = self
            .request(Method::GET, "auth/v1/user", token)?
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    fn sign_in_url(&self) -> String {
        self.authorize_url.to_string()
    }

    async fn complete_sign_in(&self, callback: &str) -> RemoteResult<Session> {
        let tokens = CallbackTokens::parse(callback, Utc::now())?;
        let user = self.fetch_user(&tokens.access_token).await?;
        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            user,
        };
        if let Err(err) = self.session_file.save(&session) {
            warn!(path = %self.session_file.path().display(), error = %err, "could not persist session");
        }
        info!(user = %session.user.id, "signed in");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn get_session(&self) -> Option<Session> {
        let session = match self.current_session() {
            Some(session) => Some(session),
            None => match self.session_file.load() {
                Ok(stored) => stored,
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable session file");
                    None
                }
            },
        };
        match session {
            Some(session) if session.is_expired() => {
                debug!(user = %session.user.id, "stored session expired");
                self.set_session(None);
                if let Err(err) = self.session_file.clear() {
                    warn!(error = %err, "could not remove expired session file");
                }
                None
            }
            Some(session) => {
                self.set_session(Some(session.clone()));
                Some(session)
            }
            None => None,
        }
    }

    async fn get_user(&self) -> RemoteResult<User> {
        let session = self
            .current_session()
            .ok_or_else(|| RemoteError::new("not signed in"))?;
        self.fetch_user(&session.access_token).await
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        let session = self.current_session();
        self.set_session(None);
        if let Err(err) = self.session_file.clear() {
            warn!(error = %err, "could not remove session file");
        }
        let Some(session) = session else {
            return Ok(());
        };
        let response = self
            .request(Method::POST, "auth/v1/logout", &session.access_token)?
            .send()
            .await?;
        check(response).await?;
        info!(user = %session.user.id, "signed out");
        Ok(())
    }
}

#[async_trait]
impl TodoTable for SupabaseClient {
    async fn select_all(&self) -> RemoteResult<Vec<Todo>> {
        let response = self
            .rows(Method::GET)?
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        decode(response).await
    }

    async fn insert(&self, row: NewTodo) -> RemoteResult<Todo> {
        let response = self
            .rows(Method::POST)?
            .query(&[("select", "*")])
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&row)
            .send()
            .await?;
        decode(response).await
    }

    async fn update(&self, id: TodoId, patch: TodoPatch) -> RemoteResult<Todo> {
        let response = self
            .rows(Method::PATCH)?
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .header("Prefer", RETURN_REPRESENTATION)
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&patch)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete(&self, id: TodoId) -> RemoteResult<()> {
        let response = self
            .rows(Method::DELETE)?
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await.map(drop)
    }
}

fn join(base: &Url, path: &str) -> RemoteResult<Url> {
    base.join(path)
        .map_err(|err| RemoteError::new(format!("invalid url {path}: {err}")))
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let response = check(response).await?;
    response
        .json()
        .await
        .map_err(|err| RemoteError::new(format!("unexpected response: {err}")))
}

async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::new(error_message(status, &body)))
}

/// GoTrue and PostgREST disagree on the field name for the message.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        })
}

/// Tokens carried in the fragment of the provider's redirect.
#[derive(Debug, PartialEq)]
struct CallbackTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl CallbackTokens {
    fn parse(callback: &str, now: DateTime<Utc>) -> RemoteResult<Self> {
        let url = Url::parse(callback.trim())
            .map_err(|err| RemoteError::new(format!("invalid callback url: {err}")))?;
        let params = url.fragment().or(url.query()).unwrap_or_default();

        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_in = None;
        let mut expires_at = None;
        for (key, value) in form_urlencoded::parse(params.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse::<i64>().ok(),
                "expires_at" => expires_at = value.parse::<i64>().ok(),
                "error_description" => return Err(RemoteError::new(value.into_owned())),
                _ => {}
            }
        }

        let access_token =
            access_token.ok_or_else(|| RemoteError::new("callback url carries no access token"))?;
        let expires_at = expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| expires_in.map(|secs| now + Duration::seconds(secs)))
            .unwrap_or_else(|| now + Duration::hours(1));

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

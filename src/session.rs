// Authenticated HTTP session against the virtual office portal

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{classify, decode_text, is_login_failure, is_login_page, PayloadKind};
use crate::config::Config;
use crate::error::CalistaError;

pub const LOGIN_PATH: &str = "/GesCon/GestionOficinaVirtual.do";
pub const DATA_PATH: &str = "/GesCon/GestionFincas.do";
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0";

/// Date format of the report query parameters
const QUERY_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedOut,
    LoggedIn,
}

/// A classified response body
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: PayloadKind,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

struct SessionState {
    status: SessionStatus,
    /// Holds the session cookie jar; dropped on logout and expiry
    client: Option<Client>,
}

enum Attempt {
    Payload(Payload),
    Expired,
}

/// Owns the portal session and recovers it once when it expires
///
/// The portal signals an expired session with a 200 response carrying the
/// login form, so every text body is checked before it is handed back.
/// All transitions happen under one lock: a fetch holds it across the
/// request, the re-login and the retry.
pub struct SessionManager {
    base_url: String,
    email: String,
    password: String,
    timeout: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
            state: Mutex::new(SessionState {
                status: SessionStatus::LoggedOut,
                client: None,
            }),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    /// Log in unless a session is already active
    #[instrument(skip(self), fields(account = %self.email))]
    pub async fn login(&self) -> Result<(), CalistaError> {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await
    }

    /// GET `path` on the active session, logging in again once on expiry
    #[instrument(skip(self, query))]
    pub async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Payload, CalistaError> {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await?;

        if let Attempt::Payload(payload) = self.attempt(&state, path, query).await? {
            return Ok(payload);
        }

        warn!("Session expired while fetching {}, logging in again", path);
        invalidate(&mut state);
        self.login_locked(&mut state).await?;

        match self.attempt(&state, path, query).await? {
            Attempt::Payload(payload) => Ok(payload),
            Attempt::Expired => {
                invalidate(&mut state);
                Err(CalistaError::Login(
                    "session expired again right after logging in".to_string(),
                ))
            }
        }
    }

    /// Request the readings report for one date window
    pub async fn fetch_report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Payload, CalistaError> {
        let query = [
            ("d-4360165-e", "2".to_string()),
            ("fechaHastaRadio", end.format(QUERY_DATE_FORMAT).to_string()),
            ("metodo", "listadoLecturasRadio".to_string()),
            ("fechaDesdeRadio", start.format(QUERY_DATE_FORMAT).to_string()),
            ("6578706f7274", "1".to_string()),
        ];

        info!("Requesting report from {} to {}", start, end);
        self.fetch(DATA_PATH, &query).await
    }

    /// End the session; failures are logged, never raised
    #[instrument(skip(self), fields(account = %self.email))]
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        if state.status == SessionStatus::LoggedOut {
            debug!("Not logged in, nothing to do");
            return;
        }

        if let Some(client) = state.client.take() {
            let result = client
                .get(self.url(LOGIN_PATH))
                .query(&[("metodo", "logOutAbonado")])
                .send()
                .await;
            match result {
                Ok(response) => debug!("Logout response status: {}", response.status()),
                Err(e) => warn!("Logout request failed: {}", e),
            }
        }

        state.status = SessionStatus::LoggedOut;
        info!("Logged out");
    }

    async fn login_locked(&self, state: &mut SessionState) -> Result<(), CalistaError> {
        if state.status == SessionStatus::LoggedIn {
            debug!("Session already active");
            return Ok(());
        }

        // Fresh cookie jar for every login
        let client = self.build_client()?;
        info!("Logging in to {}", self.base_url);

        let response = client
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("metodo", "loginAbonado"),
                ("loginName", self.email.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!("Login response status: {}", status);
        if status.is_redirection() {
            return Err(CalistaError::Login(format!(
                "portal redirected the login request ({status})"
            )));
        }
        if status != StatusCode::OK {
            return Err(CalistaError::Login(format!(
                "unexpected login response status {status}"
            )));
        }

        let content_type = content_type(&response);
        let body = response.bytes().await?;
        debug!("Login response body: {} bytes", body.len());
        if classify(&body, content_type.as_deref()) == PayloadKind::PlainText {
            let text = decode_text(&body, content_type.as_deref()).unwrap_or_default();
            if is_login_failure(&text) {
                return Err(CalistaError::Login("credentials rejected".to_string()));
            }
            if is_login_page(&text) {
                return Err(CalistaError::Login(
                    "portal answered with the login form".to_string(),
                ));
            }
        }

        self.preload(&client).await?;

        state.client = Some(client);
        state.status = SessionStatus::LoggedIn;
        info!("Logged in");
        Ok(())
    }

    /// Reports cannot be downloaded until this page has been visited
    async fn preload(&self, client: &Client) -> Result<(), CalistaError> {
        let response = client
            .get(self.url(DATA_PATH))
            .query(&[("metodo", "preCargaLecturasRadio")])
            .send()
            .await?;

        let status = response.status();
        debug!("Preload response status: {}", status);
        if !status.is_success() {
            return Err(CalistaError::Login(format!(
                "reading preload failed with status {status}"
            )));
        }
        Ok(())
    }

    async fn attempt(
        &self,
        state: &SessionState,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Attempt, CalistaError> {
        let client = state
            .client
            .as_ref()
            .ok_or_else(|| CalistaError::Login("no active session".to_string()))?;

        let response = client.get(self.url(path)).query(query).send().await?;
        let status = response.status();
        debug!("GET {} returned {}", path, status);

        // Expired sessions sometimes bounce to the login page
        if status.is_redirection() {
            return Ok(Attempt::Expired);
        }

        let response = response.error_for_status()?;
        let content_type = content_type(&response);
        let bytes = response.bytes().await?.to_vec();
        let kind = classify(&bytes, content_type.as_deref());
        debug!("Received {} bytes classified as {:?}", bytes.len(), kind);

        if kind == PayloadKind::PlainText
            && decode_text(&bytes, content_type.as_deref()).is_some_and(|text| is_login_page(&text))
        {
            return Ok(Attempt::Expired);
        }

        Ok(Attempt::Payload(Payload {
            kind,
            bytes,
            content_type,
        }))
    }

    fn build_client(&self) -> Result<Client, CalistaError> {
        Ok(Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn invalidate(state: &mut SessionState) {
    state.client = None;
    state.status = SessionStatus::LoggedOut;
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

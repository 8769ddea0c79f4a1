use std::time::Duration;

use chrono::{Datelike, Local};
use reqwest::Client;

use crate::parser::{self, ParseError};
use crate::types::{Bill, Credentials};

const BOUNCE_PATH: &str =
    "/bounce?target=//www.sfr.fr/sfr-et-moi/bounce.html&casforcetheme=mire-sfr-et-moi&mire_layer";
const CAS_LOGIN_PATH: &str =
    "/cas/login?domain=mire-sfr-et-moi&service=https://www.sfr.fr/accueil/j_spring_cas_security_check";
const CONSULTATION_PATH: &str = "/facture-fixe/consultation";

// Protocol constants the CAS login form expects alongside the token.
const CAS_EXECUTION: &str = "e1s1";
const CAS_EVENT_ID: &str = "submit";

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed during {step}: {source}")]
    Transport {
        step: &'static str,
        source: reqwest::Error,
    },
    #[error("Login page did not contain a token field")]
    TokenNotFound,
    #[error("The portal rejected the credentials")]
    AuthenticationFailed,
    #[error("Login and password must both be non-empty")]
    MissingCredentials,
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// One authenticated portal session.
///
/// The cookie jar inside the client carries the portal's login state, so
/// each pipeline run gets its own `BillScraper`; instances are never
/// shared between concurrent runs.
#[derive(Debug, Clone)]
pub struct BillScraper {
    client: Client,
    login_base: String,
    portal_base: String,
}

impl BillScraper {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|source| ScraperError::Transport {
                step: "setup",
                source,
            })?;

        Ok(Self {
            client,
            login_base: crate::LOGIN_BASE_URL.to_string(),
            portal_base: crate::PORTAL_BASE_URL.to_string(),
        })
    }

    /// Runs the whole pipeline: token, login, billing page, extraction.
    /// Fails fast; the caller gets either every extracted bill in
    /// document order or the error of the step that broke.
    pub async fn fetch_bills(&self, credentials: &Credentials) -> Result<Vec<Bill>, ScraperError> {
        if !credentials.is_complete() {
            return Err(ScraperError::MissingCredentials);
        }

        let token = self.fetch_login_token().await?;
        self.login(credentials, &token).await?;
        let html = self.fetch_billing_page().await?;

        let bills = parser::parse_bills(&html, Local::now().year())?;
        log::info!("Extracted {} bill(s)", bills.len());
        Ok(bills)
    }

    /// GETs the CAS bounce page and pulls the one-time `lt` token out of
    /// the login form.
    pub async fn fetch_login_token(&self) -> Result<String, ScraperError> {
        log::info!("Fetching the login page...");

        let url = format!("{}{}", self.login_base, BOUNCE_PATH);
        let html = self.get_html(&url, "token").await?;

        match parser::parse_login_token(&html) {
            Some(token) => {
                log::info!("Login token retrieved");
                Ok(token)
            }
            None => Err(ScraperError::TokenNotFound),
        }
    }

    /// POSTs the credentials with the token to the CAS endpoint. On
    /// success the session cookies are authenticated for the portal.
    pub async fn login(
        &self,
        credentials: &Credentials,
        token: &str,
    ) -> Result<(), ScraperError> {
        log::info!("Logging in to the portal...");

        let form = [
            ("lt", token),
            ("execution", CAS_EXECUTION),
            ("_eventId", CAS_EVENT_ID),
            ("username", credentials.login.as_str()),
            ("password", credentials.password.as_str()),
            ("identifier", ""),
        ];

        let url = format!("{}{}", self.login_base, CAS_LOGIN_PATH);
        // No error_for_status here: a rejected login renders the form
        // again rather than a clean HTTP error.
        let html = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|source| ScraperError::Transport {
                step: "login",
                source,
            })?
            .text()
            .await
            .map_err(|source| ScraperError::Transport {
                step: "login",
                source,
            })?;

        if parser::login_was_rejected(&html) {
            return Err(ScraperError::AuthenticationFailed);
        }

        log::info!("Successfully logged in");
        Ok(())
    }

    /// GETs the raw consultation page with the authenticated session.
    /// Content interpretation belongs to the parser.
    pub async fn fetch_billing_page(&self) -> Result<String, ScraperError> {
        log::info!("Fetching the billing history page...");

        let url = format!("{}{}", self.portal_base, CONSULTATION_PATH);
        self.get_html(&url, "billing").await
    }

    /// Downloads one bill document over the authenticated session.
    pub async fn download_pdf(&self, url: &str) -> Result<Vec<u8>, ScraperError> {
        log::info!("Downloading {}", url);

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ScraperError::Transport {
                step: "download",
                source,
            })?
            .bytes()
            .await
            .map_err(|source| ScraperError::Transport {
                step: "download",
                source,
            })?;

        Ok(bytes.to_vec())
    }

    async fn get_html(&self, url: &str, step: &'static str) -> Result<String, ScraperError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ScraperError::Transport { step, source })?
            .text()
            .await
            .map_err(|source| ScraperError::Transport { step, source })
    }
}

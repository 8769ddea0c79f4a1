use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Fixed vendor label attached to every extracted bill.
pub const VENDOR: &str = "Sfr";
/// Fixed bill category for the fixed-line ("box") portal.
pub const KIND: &str = "Box";

#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.login.trim().is_empty() && !self.password.is_empty()
    }
}

// The password must never reach the logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub date: NaiveDate,
    pub amount: f64,
    pub pdf_url: String,
    pub kind: String,
    pub vendor: String,
}

impl Bill {
    pub fn new(date: NaiveDate, amount: f64, pdf_url: String) -> Self {
        Bill {
            date,
            amount,
            pdf_url,
            kind: KIND.to_string(),
            vendor: VENDOR.to_string(),
        }
    }

    /// Key the storage collaborator uses to match a bill against
    /// previously persisted ones.
    pub fn dedup_key(&self) -> String {
        format!("{}|{:.2}|{}", self.date, self.amount, self.vendor)
    }
}

impl Display for Bill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} {:>8.2}\u{20ac} ({})",
            self.vendor, self.date, self.amount, self.kind
        )
    }
}

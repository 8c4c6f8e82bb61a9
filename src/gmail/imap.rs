//! Gmail IMAP client: IMAPS to imap.gmail.com:993 with XOAUTH2.
//!
//! The imap crate is blocking; callers run these functions inside
//! `spawn_blocking`. One connection is opened and closed per poll cycle.

use tracing::{info, warn};

use super::oauth::xoauth2_string;
use crate::app::{EstuaryError, Result};

const IMAP_HOST: &str = "imap.gmail.com";
const IMAP_PORT: u16 = 993;

pub struct FetchedEmail {
    pub uid: u32,
    pub raw: Vec<u8>,
}

struct XOAuth2 {
    email: String,
    access_token: String,
}

impl imap::Authenticator for XOAuth2 {
    type Response = String;

    fn process(&self, _challenge: &[u8]) -> Self::Response {
        // The IMAP layer base64-encodes this during AUTHENTICATE.
        xoauth2_string(&self.email, &self.access_token)
    }
}

/// Connect, select the label, and fetch every message with UID greater than
/// `since_uid`, in ascending UID order.
pub fn fetch_since_uid(
    email: &str,
    access_token: &str,
    label: &str,
    since_uid: u32,
) -> Result<Vec<FetchedEmail>> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(|e| EstuaryError::Imap(format!("TLS setup failed: {}", e)))?;

    let client = imap::connect((IMAP_HOST, IMAP_PORT), IMAP_HOST, &tls)
        .map_err(|e| EstuaryError::Imap(format!("IMAP connection failed: {}", e)))?;

    let auth = XOAuth2 {
        email: email.to_string(),
        access_token: access_token.to_string(),
    };
    let mut session = client
        .authenticate("XOAUTH2", &auth)
        .map_err(|(e, _)| EstuaryError::Imap(format!("IMAP authentication failed: {}", e)))?;

    let result = fetch_from_session(&mut session, label, since_uid);
    let _ = session.logout();
    result
}

fn fetch_from_session<T: std::io::Read + std::io::Write>(
    session: &mut imap::Session<T>,
    label: &str,
    since_uid: u32,
) -> Result<Vec<FetchedEmail>> {
    // Gmail labels with spaces need quoting.
    session
        .select(format!("\"{}\"", label))
        .map_err(|e| EstuaryError::Imap(format!("Failed to select label '{}': {}", label, e)))?;

    let criteria = if since_uid > 0 {
        format!("UID {}:*", since_uid + 1)
    } else {
        "ALL".to_string()
    };
    let uids = session
        .uid_search(&criteria)
        .map_err(|e| EstuaryError::Imap(format!("UID search failed: {}", e)))?;

    // The range search can include the boundary UID itself.
    let mut uids: Vec<u32> = uids.into_iter().filter(|uid| *uid > since_uid).collect();
    uids.sort_unstable();

    if uids.is_empty() {
        info!("No new emails to fetch");
        return Ok(Vec::new());
    }
    info!("Fetching {} new emails", uids.len());

    let mut emails = Vec::new();
    for uid in uids {
        match session.uid_fetch(uid.to_string(), "RFC822") {
            Ok(messages) => {
                for message in messages.iter() {
                    if let Some(body) = message.body() {
                        emails.push(FetchedEmail {
                            uid,
                            raw: body.to_vec(),
                        });
                    }
                }
            }
            Err(e) => {
                warn!("Failed to fetch email UID {}: {}", uid, e);
            }
        }
    }

    Ok(emails)
}

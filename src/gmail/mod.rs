//! Gmail newsletter intake: OAuth token upkeep, IMAP fetching, and the
//! periodic polling loop.

pub mod imap;
pub mod oauth;
pub mod poller;

pub use poller::{GmailPoller, PollStats};

//! Moderation operations: bans, role promotion, and the group join-request
//! workflow. Each operation validates the acting user's role before any
//! state changes, then broadcasts the outcome to affected parties.

pub mod ban;
pub mod promote;
pub mod requests;

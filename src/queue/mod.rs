//! Queue store access
//!
//! This module handles:
//! - Fetching pending commands, oldest first
//! - Conditional claiming and terminal status writes
//! - Heartbeat upserts and best-effort event/timeline appends

mod supabase;
mod traits;

pub use supabase::{QueueTables, SupabaseEndpoint, SupabaseQueue};
pub use traits::{ClaimOutcome, QueueClient, QueueError};

// PostgREST client for the billing database
//
// Only the verbs the orchestrator needs: filtered select, insert, and
// filtered update. Filters use PostgREST's `column=op.value` syntax.

mod client;
mod query;

pub use client::PostgrestClient;
pub use query::Query;

use std::fmt::Display;

/// Builder for PostgREST query-string filters.
///
/// ```
/// use netorch_api::Query;
/// let q = Query::new().eq("status", "active").order("created_at", true).limit(10);
/// assert_eq!(
///     q.params(),
///     &[
///         ("status".to_owned(), "eq.active".to_owned()),
///         ("order".to_owned(), "created_at.desc".to_owned()),
///         ("limit".to_owned(), "10".to_owned()),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_owned(), value));
        self
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.push(column, format!("eq.{value}"))
    }

    /// `column >= value`
    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.push(column, format!("gte.{value}"))
    }

    /// `column IS NOT NULL`
    pub fn not_null(self, column: &str) -> Self {
        self.push(column, "not.is.null".to_owned())
    }

    /// Restrict the returned columns (`select=a,b,c`).
    pub fn select(self, columns: &str) -> Self {
        self.push("select", columns.to_owned())
    }

    pub fn order(self, column: &str, descending: bool) -> Self {
        let dir = if descending { "desc" } else { "asc" };
        self.push("order", format!("{column}.{dir}"))
    }

    pub fn limit(self, n: usize) -> Self {
        self.push("limit", n.to_string())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filters_keep_insertion_order() {
        let q = Query::new()
            .eq("client_id", 42)
            .gte("recorded_at", "2026-10-01T00:00:00Z")
            .not_null("ip_address");
        let keys: Vec<&str> = q.params().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["client_id", "recorded_at", "ip_address"]);
        assert_eq!(q.params()[1].1, "gte.2026-10-01T00:00:00Z");
        assert_eq!(q.params()[2].1, "not.is.null");
    }
}

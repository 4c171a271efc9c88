//! Shared pagination shape for read-model repository queries.

/// A page of results from a repository search, alongside the total count
/// matching the filter (not just the page itself) so callers can render
/// pagination controls without a second count query.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// The total number of items matching the filter, across all pages.
    pub total: u64,
    /// The offset this page started at.
    pub offset: u32,
    /// The maximum number of items this page could contain.
    pub limit: u32,
}

/// Sort direction for a repository search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest/smallest first.
    Ascending,
    /// Newest/largest first.
    Descending,
}

impl SortOrder {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

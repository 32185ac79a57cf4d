//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each metadata and statement cache.
    pub cache_capacity: usize,

    /// Number of compiled statements the engine keeps per connection.
    pub statement_cache_capacity: usize,

    /// Whether paged queries record their query plan first.
    pub capture_explain_query_plan: bool,

    /// Page size used by query specs parsed without one.
    pub default_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            statement_cache_capacity: 256,
            capture_explain_query_plan: false,
            default_page_size: 10,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of each metadata and statement cache.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the engine-side compiled statement capacity.
    #[must_use]
    pub const fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Sets whether paged queries capture their query plan.
    #[must_use]
    pub const fn capture_explain_query_plan(mut self, value: bool) -> Self {
        self.capture_explain_query_plan = value;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }
}

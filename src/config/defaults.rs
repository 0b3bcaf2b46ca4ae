//! Default values for configuration

/// Default works index to start discovery from
pub fn default_start_url() -> String {
    std::env::var("PATROLOGIA_START_URL")
        .unwrap_or_else(|_| "https://bkv.unifr.ch/de/works".to_string())
}

/// Locale path prefix enforced on every resolved TOC link
pub fn default_locale_prefix() -> String {
    "/de".to_string()
}

/// Language code stored on every Work
pub fn default_language() -> String {
    "de".to_string()
}

/// Marker identifying translated versions in the works index
pub fn default_language_marker() -> String {
    "deutsch".to_string()
}

/// Default maximum requests per second against the source site
pub fn default_requests_per_second() -> f64 {
    1.0
}

/// Default request timeout in seconds
pub fn default_fetch_timeout() -> u64 {
    30
}

/// Default user agent
pub fn default_user_agent() -> String {
    format!("patrologia/{}", env!("CARGO_PKG_VERSION"))
}

/// Default maximum fetch attempts per page
pub fn default_max_attempts() -> u32 {
    5
}

/// Default first retry delay in milliseconds
pub fn default_initial_backoff_ms() -> u64 {
    500
}

/// Default retry delay ceiling in milliseconds
pub fn default_max_backoff_ms() -> u64 {
    5000
}

/// Default relative jitter applied to retry delays
pub fn default_jitter() -> f64 {
    0.2
}

/// Default number of synthetic division URLs to probe
pub fn default_max_divisions() -> usize {
    20
}

/// Default minimum main-text length for a probe to count as a division
pub fn default_min_content_chars() -> usize {
    100
}

/// Default phrases marking a probe response as missing
pub fn default_not_found_phrases() -> Vec<String> {
    vec!["not found".to_string(), "nicht gefunden".to_string()]
}

/// Default persistence backend
pub fn default_store_backend() -> super::StoreBackend {
    super::StoreBackend::Sqlite
}

/// Default REST endpoint base URL
pub fn default_rest_url() -> String {
    std::env::var("SUPABASE_URL").unwrap_or_default()
}

/// Default environment variable holding the REST service key
pub fn default_api_key_env() -> String {
    "SUPABASE_SERVICE_KEY".to_string()
}

/// Default SQLite database file name
pub fn default_sqlite_path() -> String {
    "corpus.db".to_string()
}

/// Default rows per upsert batch
pub fn default_batch_size() -> usize {
    500
}

/// Default attempts per upsert batch
pub fn default_max_batch_attempts() -> u32 {
    3
}

/// Default QA report path
pub fn default_qa_csv() -> String {
    "qa_summary.csv".to_string()
}

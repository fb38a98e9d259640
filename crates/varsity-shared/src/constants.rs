/// Application name
pub const APP_NAME: &str = "Varsity";

/// Maximum number of files accepted in one notice create/update batch
pub const MAX_NOTICE_ATTACHMENTS: usize = 5;

/// Default number of items per listing page
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Upper bound on the per-page limit a caller may request
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

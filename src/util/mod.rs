//! Utility modules

pub mod paths;

pub use paths::{data_dir, init_data_dir, log_file_path, logs_dir};

use std::path::Path;

/// Normalize a recording source into a navigable URL. Local paths become
/// `file://` URLs; anything already carrying a scheme passes through.
pub fn page_url(source: &str) -> String {
    if source.starts_with("http://")
        || source.starts_with("https://")
        || source.starts_with("file://")
    {
        return source.to_string();
    }
    let path = Path::new(source);
    let absolute = path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    });
    format!("file://{}", absolute.display())
}

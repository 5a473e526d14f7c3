pub mod file;
pub mod http;

use std::time::Duration;

pub use file::FileConfigProvider;
pub use http::HttpConfigProvider;

use crate::ports::config_provider::ConfigProvider;

const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Pick a provider for `location`: `http(s)://` URLs are fetched, anything else
/// is read from disk.
pub fn provider_for(location: &str) -> eyre::Result<Box<dyn ConfigProvider>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(HttpConfigProvider::new(location, REMOTE_FETCH_TIMEOUT)?))
    } else {
        Ok(Box::new(FileConfigProvider::new(location)))
    }
}

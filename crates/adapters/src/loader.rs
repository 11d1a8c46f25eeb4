//! Script-loader seam for legacy adapters.
//!
//! Pre-factory adapters enqueue a bid call as a bare URL and expect the ad
//! server's response to come back through a callback surface, so the
//! loader is fire-and-forget: no return value, no body.

use tracing::warn;

pub trait ScriptLoader: Send + Sync {
    fn load_script(&self, url: &str);
}

/// Issues the script URL as a background GET and drops the body. Failures
/// are logged; the ad server response (if any) arrives out of band.
pub struct HttpScriptLoader {
    client: reqwest::Client,
}

impl HttpScriptLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpScriptLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptLoader for HttpScriptLoader {
    fn load_script(&self, url: &str) {
        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.get(&url).send().await {
                warn!(url = %url, error = %e, "Script load failed");
            }
        });
    }
}

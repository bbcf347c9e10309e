//! Request classification and strategy dispatch.

use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::cache::{CacheLayer, CacheResult, CacheStorage, RequestKey};
use crate::config::RouterConfig;
use crate::error::WorkerError;
use crate::http::{Request, Response};
use crate::platform::Network;

/// Strategy chosen for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Network-first with cache fallback
  Api,
  /// Cache-first with network fallback
  StaticAsset,
  /// Network-first with app-shell fallback
  Navigation,
  /// Network-first, store, cache fallback
  Default,
}

/// Classify a request; first match wins.
pub fn classify(config: &RouterConfig, request: &Request) -> Route {
  let path = request.path();

  if config.api_patterns.iter().any(|p| path.contains(p.as_str())) {
    return Route::Api;
  }

  if path.starts_with(&config.static_prefix) || has_static_extension(config, path) {
    return Route::StaticAsset;
  }

  if request.navigate {
    return Route::Navigation;
  }

  Route::Default
}

fn has_static_extension(config: &RouterConfig, path: &str) -> bool {
  let file = path.rsplit('/').next().unwrap_or(path);
  match file.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => config
      .static_extensions
      .contains(&ext.to_ascii_lowercase()),
    _ => false,
  }
}

/// Routes intercepted requests through the caching strategies.
pub struct Router<N: Network, S: CacheStorage> {
  config: RouterConfig,
  shell_url: Url,
  network: Arc<N>,
  cache: CacheLayer<S>,
}

impl<N: Network, S: CacheStorage> Router<N, S> {
  pub fn new(config: RouterConfig, shell_url: Url, network: Arc<N>, cache: CacheLayer<S>) -> Self {
    Self {
      config,
      shell_url,
      network,
      cache,
    }
  }

  /// Serve one request. Each strategy makes at most one network attempt.
  pub async fn handle(&self, request: &Request) -> Result<CacheResult<Response>, WorkerError> {
    let route = classify(&self.config, request);
    let key = RequestKey::for_request(request);
    let url = request.url.to_string();
    let network = &self.network;
    let fetch = || network.fetch(request);

    debug!(?route, key = key.description(), "routing request");

    match route {
      Route::StaticAsset => self
        .cache
        .cache_first(&key, fetch)
        .await
        .map_err(|source| WorkerError::AssetUnavailable { url, source }),

      Route::Api => match self.cache.network_first(&key, fetch).await {
        Ok(result) => Ok(result),
        Err(_) if self.is_messages_endpoint(request) => {
          debug!("messages endpoint offline, synthesizing empty list");
          Ok(CacheResult::synthesized(self.offline_messages()))
        }
        Err(source) => Err(WorkerError::ApiUnavailable { url, source }),
      },

      Route::Navigation => {
        let shell = RequestKey::new(crate::http::Method::Get, &self.shell_url);
        self
          .cache
          .network_or_cached(&shell, fetch)
          .await
          .map_err(|source| WorkerError::ShellUnavailable { url, source })
      }

      Route::Default => self
        .cache
        .network_first(&key, fetch)
        .await
        .map_err(|source| WorkerError::NetworkUnavailable { url, source }),
    }
  }

  fn is_messages_endpoint(&self, request: &Request) -> bool {
    request.method == crate::http::Method::Get
      && request.path().contains(self.config.messages_endpoint.as_str())
  }

  /// Placeholder list returned when messages cannot be loaded offline.
  fn offline_messages(&self) -> Response {
    Response::json(
      200,
      &serde_json::json!({
        "messages": [],
        "offline": true,
        "message": self.config.offline_message,
      }),
    )
  }
}

//! Request and response values passed between the host and the worker.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Method {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "HEAD" => Ok(Method::Head),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "PATCH" => Ok(Method::Patch),
      "DELETE" => Ok(Method::Delete),
      other => Err(eyre!("Unsupported HTTP method: {}", other)),
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// True for top-level document loads
  pub navigate: bool,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      navigate: false,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  /// A top-level document load.
  pub fn navigation(url: Url) -> Self {
    Self {
      navigate: true,
      ..Self::get(url)
    }
  }

  /// A POST carrying `payload` as its JSON body.
  pub fn post_json(url: Url, payload: &serde_json::Value) -> Result<Self> {
    let body =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize request body: {}", e))?;
    Ok(Self {
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: Some(body),
      ..Self::new(Method::Post, url)
    })
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    self
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Parse the body as JSON, if there is one.
  pub fn json_body(&self) -> Result<Option<serde_json::Value>> {
    match &self.body {
      Some(body) if !body.is_empty() => serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| eyre!("Request body is not valid JSON: {}", e)),
      _ => Ok(None),
    }
  }
}

/// A response produced by the network, the cache or the worker itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// A JSON response with the matching content type.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self {
      status,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: value.to_string().into_bytes(),
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Exactly 200; the only status worth snapshotting.
  pub fn is_ok(&self) -> bool {
    self.status == 200
  }

  /// Any 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_method_parse_is_case_insensitive() {
    assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
    assert!("TRACE".parse::<Method>().is_err());
  }

  #[test]
  fn test_post_json_sets_body_and_content_type() {
    let url = Url::parse("http://localhost/api/calls").unwrap();
    let request = Request::post_json(url, &serde_json::json!({"to": "+15550100"})).unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(
      request.json_body().unwrap(),
      Some(serde_json::json!({"to": "+15550100"}))
    );
    assert!(request
      .headers
      .iter()
      .any(|(k, v)| k == "content-type" && v == "application/json"));
  }

  #[test]
  fn test_status_helpers() {
    assert!(Response::new(200, "").is_ok());
    assert!(!Response::new(201, "").is_ok());
    assert!(Response::new(204, "").is_success());
    assert!(!Response::new(500, "").is_success());
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response = Response::new(200, "").with_header("Content-Type", "text/html");
    assert_eq!(response.header("content-type"), Some("text/html"));
  }
}

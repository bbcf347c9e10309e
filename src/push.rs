//! Push message to notification passthrough. Keeps no state.

use color_eyre::Result;
use serde::Deserialize;
use url::Url;

use crate::config::PushConfig;
use crate::platform::Platform;

pub const VIEW_ACTION: &str = "view";
pub const DISMISS_ACTION: &str = "dismiss";
pub const NOTIFICATION_TAG: &str = "dialdeck-push";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Identifies the notification when it is closed
  pub tag: String,
  pub actions: Vec<NotificationAction>,
}

#[derive(Deserialize)]
struct PushPayload {
  body: Option<String>,
}

/// Body text for a push payload: the `body` field of a JSON object, else the
/// raw text, else `None` for empty or missing payloads.
fn payload_body(data: Option<&[u8]>) -> Option<String> {
  let data = data?;
  if let Ok(PushPayload { body: Some(body) }) = serde_json::from_slice::<PushPayload>(data) {
    return Some(body);
  }
  let text = String::from_utf8_lossy(data).trim().to_string();
  (!text.is_empty() && !text.starts_with('{')).then_some(text)
}

pub struct PushHandler {
  config: PushConfig,
  view_url: Url,
}

impl PushHandler {
  pub fn new(config: PushConfig, view_url: Url) -> Self {
    Self { config, view_url }
  }

  /// Build the notification for a push payload.
  pub fn notification(&self, data: Option<&[u8]>) -> Notification {
    Notification {
      title: self.config.title.clone(),
      body: payload_body(data).unwrap_or_else(|| self.config.default_body.clone()),
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      tag: NOTIFICATION_TAG.to_string(),
      actions: vec![
        NotificationAction {
          action: VIEW_ACTION.to_string(),
          title: "View".to_string(),
        },
        NotificationAction {
          action: DISMISS_ACTION.to_string(),
          title: "Dismiss".to_string(),
        },
      ],
    }
  }

  pub fn on_push<P: Platform>(&self, data: Option<&[u8]>, platform: &P) -> Result<Notification> {
    let notification = self.notification(data);
    platform.show_notification(&notification)?;
    Ok(notification)
  }

  /// Close the clicked notification; "view" also opens the in-app route.
  /// Returns whether a window was opened.
  pub fn on_notification_click<P: Platform>(
    &self,
    tag: &str,
    action: Option<&str>,
    platform: &P,
  ) -> Result<bool> {
    platform.close_notification(tag);

    if action == Some(VIEW_ACTION) {
      platform.open_window(&self.view_url)?;
      return Ok(true);
    }
    Ok(false)
  }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A requester answered an offer.
    OfferResponse,
    /// A neighbor offered to fulfill a request.
    FoodOffer,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::OfferResponse => "offer_response",
            NotificationType::FoodOffer => "food_offer",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer_response" => Ok(NotificationType::OfferResponse),
            "food_offer" => Ok(NotificationType::FoodOffer),
            _ => Err(format!("Invalid notification type '{}'", s)),
        }
    }
}

/// A notify-user event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub related_offer_id: Option<Uuid>,
    pub related_request_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            kind,
            related_offer_id: None,
            related_request_id: None,
        }
    }

    pub fn about_offer(mut self, offer_id: Uuid, request_id: Uuid) -> Self {
        self.related_offer_id = Some(offer_id);
        self.related_request_id = Some(request_id);
        self
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(flatten)]
    pub content: NewNotification,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_read { " " } else { "*" };
        write!(
            f,
            "{} {}: {}",
            marker, self.content.title, self.content.message
        )
    }
}

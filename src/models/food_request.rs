use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            _ => Err(format!(
                "Invalid urgency '{}'. Valid options: low, medium, high",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Active,
    Fulfilled,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Active => "active",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(RequestStatus::Active),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            "cancelled" => Ok(RequestStatus::Cancelled),
            _ => Err(format!(
                "Invalid request status '{}'. Valid options: active, fulfilled, cancelled",
                s
            )),
        }
    }
}

/// A public ask posted by a user describing a food need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub item_name: String,
    pub description: String,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub related_sharer_id: Option<Uuid>,
    pub related_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for FoodRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {} [{}] ({})",
            self.id, self.item_name, self.urgency, self.status
        )?;
        if !self.description.is_empty() {
            write!(f, "\n    {}", self.description)?;
        }
        Ok(())
    }
}

/// Input for [`crate::board::RequestBoard::create`].
#[derive(Debug, Clone)]
pub struct NewFoodRequest {
    pub requester_id: Uuid,
    pub item_name: String,
    pub description: String,
    pub urgency: Urgency,
    pub related_sharer_id: Option<Uuid>,
    pub related_item_id: Option<Uuid>,
}

impl NewFoodRequest {
    pub fn new(requester_id: Uuid, item_name: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            requester_id,
            item_name: item_name.into(),
            description: String::new(),
            urgency,
            related_sharer_id: None,
            related_item_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Ties the request to a specific pantry item offered by `sharer_id`.
    pub fn for_item(mut self, sharer_id: Uuid, item_id: Uuid) -> Self {
        self.related_sharer_id = Some(sharer_id);
        self.related_item_id = Some(item_id);
        self
    }
}

/// Fields a requester may change while the request is active.
#[derive(Debug, Clone, Default)]
pub struct RequestEdit {
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub urgency: Option<Urgency>,
}

impl RequestEdit {
    pub fn is_empty(&self) -> bool {
        self.item_name.is_none() && self.description.is_none() && self.urgency.is_none()
    }
}

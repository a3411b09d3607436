use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OfferStatus::Pending),
            "accepted" => Ok(OfferStatus::Accepted),
            "declined" => Ok(OfferStatus::Declined),
            _ => Err(format!(
                "Invalid offer status '{}'. Valid options: pending, accepted, declined",
                s
            )),
        }
    }
}

/// The requester's answer to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => write!(f, "accept"),
            Decision::Decline => write!(f, "decline"),
        }
    }
}

/// A neighbor's response offering to fulfill a food request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRequestOffer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub helper_id: Uuid,
    pub message: String,
    /// Shared item handed over if this offer wins.
    pub shared_item_id: Option<Uuid>,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
}

impl FoodRequestOffer {
    pub fn new(request_id: Uuid, helper_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            helper_id,
            message: message.into(),
            shared_item_id: None,
            status: OfferStatus::Pending,
            offered_at: Utc::now(),
        }
    }
}

impl fmt::Display for FoodRequestOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  from {} ({})", self.id, self.helper_id, self.status)?;
        if !self.message.is_empty() {
            write!(f, "\n    \"{}\"", self.message)?;
        }
        Ok(())
    }
}

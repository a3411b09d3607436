use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    Available,
    Requested,
    Completed,
}

impl ShareStatus {
    /// Available and requested shares still hold their pantry item.
    pub fn is_active(&self) -> bool {
        matches!(self, ShareStatus::Available | ShareStatus::Requested)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStatus::Available => "available",
            ShareStatus::Requested => "requested",
            ShareStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(ShareStatus::Available),
            "requested" => Ok(ShareStatus::Requested),
            "completed" => Ok(ShareStatus::Completed),
            _ => Err(format!(
                "Invalid share status '{}'. Valid options: available, requested, completed",
                s
            )),
        }
    }
}

/// A pantry item published by its owner for a neighbor to claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedItem {
    pub id: Uuid,
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub status: ShareStatus,
    pub offered_at: DateTime<Utc>,
}

impl SharedItem {
    pub fn new(item_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            owner_id,
            status: ShareStatus::Available,
            offered_at: Utc::now(),
        }
    }
}

/// An available share joined with the pantry fields needed for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableShare {
    #[serde(flatten)]
    pub share: SharedItem,
    pub name: String,
    pub quantity: f64,
    pub expiration_date: Option<NaiveDate>,
    /// Distance to the owner when listed through a candidate set.
    pub distance_km: Option<f64>,
}

impl fmt::Display for AvailableShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {} x{}", self.share.id, self.name, self.quantity)?;
        if let Some(date) = self.expiration_date {
            write!(f, "  expires {}", date)?;
        }
        if let Some(km) = self.distance_km {
            write!(f, "  {:.1} km", km)?;
        }
        Ok(())
    }
}

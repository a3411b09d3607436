use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An item in a user's pantry. Owned by the pantry layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub quantity: f64,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl PantryItem {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            quantity: 1.0,
            expiration_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_expiration(mut self, date: NaiveDate) -> Self {
        self.expiration_date = Some(date);
        self
    }
}

impl fmt::Display for PantryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.name, self.quantity)?;
        if let Some(date) = self.expiration_date {
            write!(f, " (expires {})", date)?;
        }
        Ok(())
    }
}

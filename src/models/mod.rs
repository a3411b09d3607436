mod food_request;
mod location;
mod notification;
mod offer;
mod pantry;
mod shared_item;

pub use food_request::{FoodRequest, NewFoodRequest, RequestEdit, RequestStatus, Urgency};
pub use location::{GeoPoint, UserLocation};
pub use notification::{NewNotification, Notification, NotificationType};
pub use offer::{Decision, FoodRequestOffer, OfferStatus};
pub use pantry::PantryItem;
pub use shared_item::{AvailableShare, ShareStatus, SharedItem};

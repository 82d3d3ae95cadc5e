//! Entity descriptors of the tour-booking domain

use std::sync::Arc;

use crate::auth::PasswordHasher;
use crate::error::Result;
use crate::model::Database;
use crate::store::DocumentStore;

pub mod booking;
pub mod review;
pub mod tour;
pub mod user;

pub use user::Role;

/// Tour entity name
pub const TOUR: &str = "Tour";
/// Review entity name
pub const REVIEW: &str = "Review";
/// User entity name
pub const USER: &str = "User";
/// Booking entity name
pub const BOOKING: &str = "Booking";

/// Register every entity over `store`
pub async fn open(store: Arc<dyn DocumentStore>, hasher: PasswordHasher) -> Result<Database> {
    Database::builder(store)
        .register(tour::descriptor())
        .register(review::descriptor())
        .register(user::descriptor(hasher))
        .register(booking::descriptor())
        .build()
        .await
}

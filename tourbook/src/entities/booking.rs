//! Bookings

use crate::model::{EntityDescriptor, FieldSchema, Populate, Schema};
use crate::store::Projection;

use super::{BOOKING, TOUR, USER};

/// Booking descriptor: user and tour name populated
pub fn descriptor() -> EntityDescriptor {
    let schema = Schema::new()
        .field(
            "tour",
            FieldSchema::object_id().required("Booking must belong to a Tour!"),
        )
        .field(
            "user",
            FieldSchema::object_id().required("Booking must belong to a User!"),
        )
        .field("price", FieldSchema::number().required("Booking must have a price."))
        .field("createdAt", FieldSchema::date().default_now())
        .field("paid", FieldSchema::boolean().default_value(true));

    EntityDescriptor::new(BOOKING, "bookings", schema)
        .populate_on_query(Populate::reference("user", USER))
        .populate_on_query(
            Populate::reference("tour", TOUR).select(Projection::Include(vec!["name".to_string()])),
        )
}

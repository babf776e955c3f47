use crate::db::traits::StorageError;

/// Read access to the distances the geocoding collaborator has computed for delivery addresses. The delivery fee is
/// always based on these, never on a distance the client submits.
#[allow(async_fn_in_trait)]
pub trait GeocodingManagement {
    /// The distance in metres to `address_id` from the kitchen serving `zone_id`. `None` if the address is unknown or
    /// was geocoded for another zone.
    async fn fetch_delivery_distance(&self, zone_id: i64, address_id: i64) -> Result<Option<i64>, StorageError>;
}

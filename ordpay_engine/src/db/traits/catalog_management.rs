use crate::{
    db::traits::StorageError,
    db_types::{DeliveryZone, Product},
};

/// Read-only access to the catalog collaborator's data. Prices, VAT rates, stock and delivery zones are always read
/// from here at pricing time; client-submitted values are never trusted.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Fetches the products with the given ids. Unknown ids are simply absent from the result.
    async fn fetch_products(&self, ids: &[i64]) -> Result<Vec<Product>, StorageError>;

    async fn fetch_delivery_zone(&self, id: i64) -> Result<Option<DeliveryZone>, StorageError>;
}

//! Cart domain rules shared by the cart routes.

use std::collections::HashMap;

use crate::models::CartItemEntity;

/// Returns the vendor already present in the cart when it differs from the
/// vendor of the product being added. All items of a cart share one vendor,
/// so the first differing item is enough.
pub fn vendor_conflict(items: &[CartItemEntity], vendor_id: i32) -> Option<i32> {
    items
        .iter()
        .map(|item| item.vendor_id)
        .find(|&existing| existing != vendor_id)
}

pub fn total_price(items: &[CartItemEntity], unit_prices: &HashMap<i32, f32>) -> f32 {
    items
        .iter()
        .map(|item| {
            let unit_price = unit_prices.get(&item.product_id).copied().unwrap_or(0.0);
            item.quantity as f32 * unit_price
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(product_id: i32, vendor_id: i32, quantity: i32) -> CartItemEntity {
        CartItemEntity {
            cart_id: 1,
            product_id,
            vendor_id,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_cart_accepts_any_vendor() {
        assert_eq!(vendor_conflict(&[], 5), None);
    }

    #[test]
    fn same_vendor_passes() {
        let items = [item(1, 5, 2), item(2, 5, 1)];
        assert_eq!(vendor_conflict(&items, 5), None);
    }

    #[test]
    fn different_vendor_reports_the_existing_one() {
        let items = [item(1, 5, 2)];
        assert_eq!(vendor_conflict(&items, 9), Some(5));
    }

    #[test]
    fn total_price_multiplies_quantities() {
        let items = [item(1, 5, 2), item(2, 5, 3)];
        let prices = HashMap::from([(1, 10.0), (2, 2.5)]);
        assert_eq!(total_price(&items, &prices), 27.5);
    }

    #[test]
    fn unknown_products_count_as_zero() {
        let items = [item(1, 5, 2)];
        assert_eq!(total_price(&items, &HashMap::new()), 0.0);
    }
}

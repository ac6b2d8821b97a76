pub mod availability;
pub mod products;

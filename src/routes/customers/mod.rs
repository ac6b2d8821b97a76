pub mod bookings;
pub mod carts;

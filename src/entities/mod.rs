pub mod cart;
pub mod order;
pub mod review;

pub use order::{OrderStatus, PaymentMethod};

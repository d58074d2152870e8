pub mod types;

pub use types::{MessageId, OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};

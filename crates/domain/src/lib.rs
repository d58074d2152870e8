pub mod cart;
pub mod catalog;
pub mod chat;
pub mod error;
pub mod money;
pub mod order;

pub use cart::CartLine;
pub use catalog::Product;
pub use chat::{Message, MessageKind, NegotiationThread, Party};
pub use common::{MessageId, OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
pub use error::{DomainError, UnknownTag};
pub use money::Money;
pub use order::{Order, OrderLine, OrderOrigin, OrderStatus};

pub mod booking;
pub mod capacity;
pub mod identity;
pub mod notification;
pub mod slot;
pub mod store;

pub use booking::*;
pub use capacity::*;
pub use identity::*;
pub use notification::*;
pub use slot::*;
pub use store::*;

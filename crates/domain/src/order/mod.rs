//! Order engine: cart validation, atomic placement and the status lifecycle.

mod commands;
mod service;
mod state;
mod view;

pub use commands::{CartItem, MAX_QUANTITY, PlaceOrder, UpdateStatus};
pub use service::OrderService;
pub use state::TransitionPolicy;
pub use view::{OrderItemView, OrderView};

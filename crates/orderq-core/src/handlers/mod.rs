//! Task handlers for the two order task kinds.
//!
//! Both are idempotent: the broker delivers at least once, and the scheduler
//! may enqueue the same logical task twice.

mod close_order;
mod notify_payment;

pub use close_order::OrderCloseHandler;
pub use notify_payment::{PaySuccessNotifyHandler, render_payment_message};

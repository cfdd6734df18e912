//! Application layer: scheduling, push executors and the checkout state machine.
//!
//! Each synchronized resource (customer addresses, checkout fields) has its
//! own executor with its own [`Debouncer`](debouncer::Debouncer) and
//! bookkeeping. [`CheckoutProcessor`](submission::CheckoutProcessor) sequences
//! a submission and asks the [`ObserverRegistry`](observers::ObserverRegistry)
//! for a verdict at each phase.

pub mod bookkeeping;
pub mod checkout_sync;
pub mod customer_sync;
pub mod debouncer;
pub mod engine;
pub mod observers;
pub mod submission;

pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod identity;
pub mod ids;
pub mod lifecycle;
pub mod maps;
pub mod pricing;
pub mod ride;
pub mod spatial;
pub mod store;

#[cfg(feature = "test-helpers")]
pub mod test_support;

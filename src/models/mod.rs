pub mod chat;
pub mod driver;
pub mod invoice;
pub mod maintenance;
pub mod session;
pub mod trip;

pub mod actions;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod reimbursement;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

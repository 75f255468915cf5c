pub mod gas_model;
pub mod lacchain_client;

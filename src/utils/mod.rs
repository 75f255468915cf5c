pub mod canonical;
pub mod crypto;
pub mod serialization;
pub mod single_flight;

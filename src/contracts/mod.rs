pub mod verification_registry;

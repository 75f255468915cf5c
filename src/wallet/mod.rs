pub mod didcomm;
pub mod key_management;
pub mod key_resolution;
pub mod remote_signer;

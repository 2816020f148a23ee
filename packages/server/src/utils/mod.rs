pub mod filename;
pub mod fingerprint;
pub mod hash;
pub mod jwt;

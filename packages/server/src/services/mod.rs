pub mod blob;
pub mod device;
pub mod document;
pub mod user;

pub mod document;
pub mod document_version;
pub mod login_device;
pub mod user;

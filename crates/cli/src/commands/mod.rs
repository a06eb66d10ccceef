pub mod chat;
pub mod init;
pub mod session;
pub mod status;

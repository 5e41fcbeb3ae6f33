pub mod ask;
pub mod init;
pub mod ping;
pub mod providers;

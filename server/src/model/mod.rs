pub mod receiver;
pub mod response;
pub mod transaction;

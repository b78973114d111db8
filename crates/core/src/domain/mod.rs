pub mod conversation;
pub mod intent;
pub mod reservation;
pub mod subscription;
pub mod ticket;
pub mod user;

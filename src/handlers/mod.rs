pub mod device_handlers;
pub mod health;
pub mod presence_handlers;

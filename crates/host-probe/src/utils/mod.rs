pub mod architecture;
pub mod platform;

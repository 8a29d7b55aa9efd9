// Domain model for meters and their readings

pub mod device;
pub mod reading;

pub use device::{Device, MeterType};
pub use reading::Reading;

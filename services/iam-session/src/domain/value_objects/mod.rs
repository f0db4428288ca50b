//! 值对象

mod device_info;

pub use device_info::*;

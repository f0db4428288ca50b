//! 基础设施层

pub mod bootstrap;
pub mod cache;
pub mod cleanup;
pub mod persistence;

//! IAM Session Service Library
//!
//! 认证与会话安全核心：
//! - `domain`: 实体、仓储接口、领域服务（会话、吊销、锁定、可疑检测、审计）
//! - `application`: `AuthCoordinator`，对外的 login / refresh / logout / validate
//! - `infrastructure`: 内存 / PostgreSQL / Redis 实现、定期清理、组装

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

//! aegis-auth-core - 认证核心库
//!
//! 非对称密钥、JWT Claims、令牌签发与验证。验证是纯函数，不访问任何存储，
//! 吊销检查由调用方负责。

mod claims;
mod error;
mod issuer;
mod keys;

pub use claims::*;
pub use error::*;
pub use issuer::*;
pub use keys::*;

//! 设备信息

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 客户端设备信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub device_id: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        user_agent: Option<String>,
        platform: Option<String>,
        device_id: Option<String>,
    ) -> Self {
        Self {
            user_agent,
            platform,
            device_id,
        }
    }

    /// 设备指纹：`user_agent|platform|device_id` 的 SHA-256（小写十六进制）
    pub fn fingerprint(&self) -> String {
        let raw = format!(
            "{}|{}|{}",
            self.user_agent.as_deref().unwrap_or_default(),
            self.platform.as_deref().unwrap_or_default(),
            self.device_id.as_deref().unwrap_or_default(),
        );
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let device = DeviceInfo::new(
            Some("Mozilla/5.0".to_string()),
            Some("macOS".to_string()),
            Some("device-1".to_string()),
        );
        assert_eq!(device.fingerprint(), device.clone().fingerprint());
        assert_eq!(device.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_devices() {
        let a = DeviceInfo::new(Some("Mozilla/5.0".to_string()), None, Some("a".to_string()));
        let b = DeviceInfo::new(Some("Mozilla/5.0".to_string()), None, Some("b".to_string()));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}

//! 签名密钥

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::TokenError;

/// 支持的非对称签名算法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// Ed25519
    EdDSA,
    RS256,
    ES256,
}

impl SigningAlgorithm {
    pub fn as_jwt_algorithm(&self) -> Algorithm {
        match self {
            Self::EdDSA => Algorithm::EdDSA,
            Self::RS256 => Algorithm::RS256,
            Self::ES256 => Algorithm::ES256,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EDDSA" | "ED25519" => Ok(Self::EdDSA),
            "RS256" => Ok(Self::RS256),
            "ES256" => Ok(Self::ES256),
            other => Err(TokenError::InvalidKey(format!(
                "Unsupported signing algorithm: {}",
                other
            ))),
        }
    }
}

/// 非对称密钥对
///
/// 进程启动时加载一次。只持有公钥的实例只能验证、不能签发。
#[derive(Clone)]
pub struct KeyMaterial {
    algorithm: SigningAlgorithm,
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl KeyMaterial {
    /// 从 PEM 内容构造
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, TokenError> {
        let encoding = match algorithm {
            SigningAlgorithm::EdDSA => EncodingKey::from_ed_pem(private_pem),
            SigningAlgorithm::RS256 => EncodingKey::from_rsa_pem(private_pem),
            SigningAlgorithm::ES256 => EncodingKey::from_ec_pem(private_pem),
        }
        .map_err(|e| TokenError::InvalidKey(format!("private key: {}", e)))?;

        let mut keys = Self::verifier_only(algorithm, public_pem)?;
        keys.encoding = Some(encoding);
        Ok(keys)
    }

    /// 仅用公钥构造（只验证）
    pub fn verifier_only(
        algorithm: SigningAlgorithm,
        public_pem: &[u8],
    ) -> Result<Self, TokenError> {
        let decoding = match algorithm {
            SigningAlgorithm::EdDSA => DecodingKey::from_ed_pem(public_pem),
            SigningAlgorithm::RS256 => DecodingKey::from_rsa_pem(public_pem),
            SigningAlgorithm::ES256 => DecodingKey::from_ec_pem(public_pem),
        }
        .map_err(|e| TokenError::InvalidKey(format!("public key: {}", e)))?;

        Ok(Self {
            algorithm,
            encoding: None,
            decoding,
        })
    }

    /// 从 PEM 文件加载
    pub fn load(
        algorithm: SigningAlgorithm,
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, TokenError> {
        let private_pem = read_pem(private_key_path.as_ref())?;
        let public_pem = read_pem(public_key_path.as_ref())?;
        Self::from_pem(algorithm, &private_pem, &public_pem)
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub(crate) fn encoding_key(&self) -> Result<&EncodingKey, TokenError> {
        self.encoding
            .as_ref()
            .ok_or_else(|| TokenError::InvalidKey("signing key not loaded".to_string()))
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TokenError> {
    std::fs::read(path)
        .map_err(|e| TokenError::InvalidKey(format!("failed to read {}: {}", path.display(), e)))
}

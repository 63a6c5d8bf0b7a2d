//! 额度账本
//!
//! 编排层只通过 [`QuotaLedger`] 使用额度：评分前 `ensure_scope_quota`，
//! 评分成功后 `decrement`。实现方必须保证扣减是可串行化的读-改-写。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{GradingError, LicenseErrorCode};
use crate::models::identity::{QuotaStatus, ScopeIdentity};

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// 确认 scope 可用并返回当前额度（不扣减）
    async fn ensure_scope_quota(&self, identity: &ScopeIdentity) -> Result<QuotaStatus, GradingError>;

    /// 原子扣减一次，返回剩余额度
    async fn decrement(&self, scope_key: &str) -> Result<u32, GradingError>;
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    remaining: u32,
    total: u32,
    is_paid: bool,
    disabled: bool,
    expires_at: Option<DateTime<Utc>>,
    devices: HashSet<String>,
    max_devices: usize,
}

impl ScopeEntry {
    fn status(&self, scope_key: &str) -> QuotaStatus {
        QuotaStatus {
            scope_key: scope_key.to_string(),
            remaining: self.remaining,
            total: self.total,
            is_paid: self.is_paid,
        }
    }
}

/// 进程内额度账本
///
/// 一把互斥锁串行化所有读-改-写；设备首次出现时自动发放试用额度，
/// 授权码必须先登记。
pub struct InMemoryQuotaLedger {
    free_quota: u32,
    scopes: Mutex<HashMap<String, ScopeEntry>>,
}

impl InMemoryQuotaLedger {
    pub fn new(free_quota: u32) -> Self {
        Self {
            free_quota,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// 登记授权码
    pub async fn register_license(
        &self,
        code: &str,
        total: u32,
        max_devices: usize,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let key = ScopeIdentity::license(code, None).scope_key();
        info!("登记授权码 {} (额度 {}, 设备上限 {})", key, total, max_devices);
        self.scopes.lock().await.insert(
            key,
            ScopeEntry {
                remaining: total,
                total,
                is_paid: true,
                disabled: false,
                expires_at,
                devices: HashSet::new(),
                max_devices,
            },
        );
    }

    /// 停用授权码
    pub async fn disable_license(&self, code: &str) {
        let key = ScopeIdentity::license(code, None).scope_key();
        if let Some(entry) = self.scopes.lock().await.get_mut(&key) {
            entry.disabled = true;
        }
    }

    /// 查询剩余额度（不存在返回 None）
    pub async fn remaining(&self, scope_key: &str) -> Option<u32> {
        self.scopes
            .lock()
            .await
            .get(scope_key)
            .map(|entry| entry.remaining)
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn ensure_scope_quota(&self, identity: &ScopeIdentity) -> Result<QuotaStatus, GradingError> {
        let key = identity.scope_key();
        let mut scopes = self.scopes.lock().await;

        match identity {
            ScopeIdentity::Device { .. } => {
                let free_quota = self.free_quota;
                let entry = scopes.entry(key.clone()).or_insert_with(|| {
                    debug!("新设备 {}，发放试用额度 {}", key, free_quota);
                    ScopeEntry {
                        remaining: free_quota,
                        total: free_quota,
                        is_paid: false,
                        disabled: false,
                        expires_at: None,
                        devices: HashSet::new(),
                        max_devices: 1,
                    }
                });
                Ok(entry.status(&key))
            }
            ScopeIdentity::License { device_id, .. } => {
                let entry = scopes.get_mut(&key).ok_or_else(|| {
                    GradingError::license(LicenseErrorCode::NotFound, format!("授权码 {} 不存在", key))
                })?;

                if entry.disabled {
                    return Err(GradingError::license(
                        LicenseErrorCode::Disabled,
                        format!("授权码 {} 已停用", key),
                    ));
                }
                if let Some(expires_at) = entry.expires_at {
                    if expires_at <= Utc::now() {
                        return Err(GradingError::license(
                            LicenseErrorCode::Expired,
                            format!("授权码 {} 已于 {} 过期", key, expires_at.format("%Y-%m-%d")),
                        ));
                    }
                }
                if let Some(device_id) = device_id {
                    if !entry.devices.contains(device_id) {
                        if entry.devices.len() >= entry.max_devices {
                            return Err(GradingError::license(
                                LicenseErrorCode::DeviceLimitReached,
                                format!("授权码 {} 已绑定 {} 台设备", key, entry.devices.len()),
                            ));
                        }
                        entry.devices.insert(device_id.clone());
                    }
                }
                Ok(entry.status(&key))
            }
        }
    }

    async fn decrement(&self, scope_key: &str) -> Result<u32, GradingError> {
        let mut scopes = self.scopes.lock().await;
        let entry = scopes
            .get_mut(scope_key)
            .ok_or_else(|| GradingError::Config(format!("未知的 scope: {}", scope_key)))?;

        if entry.remaining == 0 {
            return Err(GradingError::QuotaExhausted {
                scope_key: scope_key.to_string(),
                total: entry.total,
            });
        }
        entry.remaining -= 1;
        debug!("{} 扣减额度，剩余 {}/{}", scope_key, entry.remaining, entry.total);
        Ok(entry.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_device_gets_free_quota() {
        let ledger = InMemoryQuotaLedger::new(2);
        let identity = ScopeIdentity::device("dev-1");

        let status = ledger.ensure_scope_quota(&identity).await.unwrap();
        assert_eq!(status.remaining, 2);
        assert!(!status.is_paid);

        assert_eq!(ledger.decrement(&status.scope_key).await.unwrap(), 1);
        assert_eq!(ledger.decrement(&status.scope_key).await.unwrap(), 0);
        let err = tokio_test::assert_err!(ledger.decrement(&status.scope_key).await);
        assert_eq!(err.code(), "quota_exhausted");
    }

    #[tokio::test]
    async fn test_license_errors() {
        let ledger = InMemoryQuotaLedger::new(0);

        let missing = ledger
            .ensure_scope_quota(&ScopeIdentity::license("nope", None))
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "license_not_found");

        ledger
            .register_license("old", 10, 1, Some(Utc::now() - Duration::days(1)))
            .await;
        let expired = ledger
            .ensure_scope_quota(&ScopeIdentity::license("old", None))
            .await
            .unwrap_err();
        assert_eq!(expired.code(), "license_expired");

        ledger.register_license("off", 10, 1, None).await;
        ledger.disable_license("off").await;
        let disabled = ledger
            .ensure_scope_quota(&ScopeIdentity::license("off", None))
            .await
            .unwrap_err();
        assert_eq!(disabled.code(), "license_disabled");
    }

    #[tokio::test]
    async fn test_device_limit() {
        let ledger = InMemoryQuotaLedger::new(0);
        ledger.register_license("team", 100, 1, None).await;

        let first = ScopeIdentity::license("team", Some("a".to_string()));
        let status = ledger.ensure_scope_quota(&first).await.unwrap();
        assert!(status.is_paid);
        assert_eq!(status.scope_key, "license:TEAM");
        // 同一设备可以重复使用
        tokio_test::assert_ok!(ledger.ensure_scope_quota(&first).await);

        let second = ScopeIdentity::license("team", Some("b".to_string()));
        let err = ledger.ensure_scope_quota(&second).await.unwrap_err();
        assert_eq!(err.code(), "device_limit_reached");
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_overdraw() {
        let ledger = Arc::new(InMemoryQuotaLedger::new(5));
        let status = ledger
            .ensure_scope_quota(&ScopeIdentity::device("shared"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                let key = status.scope_key.clone();
                tokio::spawn(async move { ledger.decrement(&key).await.is_ok() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(ledger.remaining(&status.scope_key).await, Some(0));
    }
}

//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース

use crate::domain::ids::ReleaseId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は release の実行 ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（release はバックグラウンドで走るため）
pub trait IdGenerator: Send + Sync {
    fn generate_release_id(&self) -> ReleaseId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_release_id(&self) -> ReleaseId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        ReleaseId::from(ulid)
    }
}

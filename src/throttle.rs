// 该文件是 Saomiao （扫描） 项目的一部分。
// src/throttle.rs - 检测器调用频率控制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{
  DEFAULT_BARCODE_INTERVAL_MS, DEFAULT_DOCUMENT_INTERVAL_MS, DEFAULT_OBJECT_INTERVAL_MS,
  ThrottleConfig,
};
use crate::detection::DetectorType;

const NEVER: i64 = i64::MIN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThrottleError {
  #[error("参数无效: {kind} 检测器的最小调用间隔不能为负数 ({interval_ms} ms)")]
  InvalidArgument { kind: DetectorType, interval_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottleStats {
  pub min_interval_ms: u64,
  pub last_invocation_ms: Option<i64>,
  pub time_since_last_ms: Option<i64>,
}

#[derive(Debug)]
struct Bucket {
  min_interval_ms: AtomicU64,
  last_invocation_ms: AtomicI64,
}

impl Bucket {
  fn new(min_interval_ms: u64) -> Self {
    Self {
      min_interval_ms: AtomicU64::new(min_interval_ms),
      last_invocation_ms: AtomicI64::new(NEVER),
    }
  }

  fn interval(&self) -> i64 {
    self.min_interval_ms.load(Ordering::Acquire) as i64
  }

  fn allows(&self, last: i64, now: i64) -> bool {
    last == NEVER || now.saturating_sub(last) >= self.interval()
  }
}

/// 按检测器类型独立限制推理调用频率
///
/// 所有方法只需要 `&self`；`try_invoke` 对每个桶使用 CAS，
/// 同一类型的并发调用者中最多只有一个会被放行。
#[derive(Debug)]
pub struct ThrottleHelper {
  buckets: [Bucket; 3],
}

impl Default for ThrottleHelper {
  fn default() -> Self {
    Self {
      buckets: [
        Bucket::new(DEFAULT_OBJECT_INTERVAL_MS),
        Bucket::new(DEFAULT_BARCODE_INTERVAL_MS),
        Bucket::new(DEFAULT_DOCUMENT_INTERVAL_MS),
      ],
    }
  }
}

impl ThrottleHelper {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_config(config: &ThrottleConfig) -> Result<Self, ThrottleError> {
    let helper = Self::default();
    for kind in DetectorType::ALL {
      helper.set_min_interval(kind, config.interval(kind))?;
    }
    Ok(helper)
  }

  fn bucket(&self, kind: DetectorType) -> &Bucket {
    &self.buckets[kind.index()]
  }

  pub fn can_invoke(&self, kind: DetectorType, now_ms: i64) -> bool {
    let bucket = self.bucket(kind);
    bucket.allows(bucket.last_invocation_ms.load(Ordering::Acquire), now_ms)
  }

  /// 记录一次调用，不检查是否允许
  pub fn record_invocation(&self, kind: DetectorType, now_ms: i64) {
    self
      .bucket(kind)
      .last_invocation_ms
      .store(now_ms, Ordering::Release);
  }

  /// 检查并记录，返回本次调用是否被放行
  pub fn try_invoke(&self, kind: DetectorType, now_ms: i64) -> bool {
    let bucket = self.bucket(kind);
    let mut last = bucket.last_invocation_ms.load(Ordering::Acquire);
    loop {
      if !bucket.allows(last, now_ms) {
        trace!("{} 检测器被限流", kind);
        return false;
      }
      match bucket.last_invocation_ms.compare_exchange_weak(
        last,
        now_ms,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return true,
        Err(current) => last = current,
      }
    }
  }

  pub fn set_min_interval(&self, kind: DetectorType, interval_ms: i64) -> Result<(), ThrottleError> {
    if interval_ms < 0 {
      return Err(ThrottleError::InvalidArgument { kind, interval_ms });
    }
    debug!("设置 {} 检测器最小调用间隔: {} ms", kind, interval_ms);
    self
      .bucket(kind)
      .min_interval_ms
      .store(interval_ms as u64, Ordering::Release);
    Ok(())
  }

  pub fn min_interval(&self, kind: DetectorType) -> u64 {
    self.bucket(kind).min_interval_ms.load(Ordering::Acquire)
  }

  /// 距离下一次允许调用还需等待的毫秒数，已允许时为 0
  pub fn time_until_allowed(&self, kind: DetectorType, now_ms: i64) -> u64 {
    let bucket = self.bucket(kind);
    let last = bucket.last_invocation_ms.load(Ordering::Acquire);
    if last == NEVER {
      return 0;
    }
    let next = last.saturating_add(bucket.interval());
    next.saturating_sub(now_ms).max(0) as u64
  }

  pub fn reset(&self, kind: DetectorType) {
    self
      .bucket(kind)
      .last_invocation_ms
      .store(NEVER, Ordering::Release);
  }

  pub fn reset_all(&self) {
    for kind in DetectorType::ALL {
      self.reset(kind);
    }
  }

  pub fn stats(&self, now_ms: i64) -> BTreeMap<DetectorType, ThrottleStats> {
    DetectorType::ALL
      .into_iter()
      .map(|kind| {
        let bucket = self.bucket(kind);
        let last = bucket.last_invocation_ms.load(Ordering::Acquire);
        let last_invocation_ms = (last != NEVER).then_some(last);
        let stats = ThrottleStats {
          min_interval_ms: self.min_interval(kind),
          last_invocation_ms,
          time_since_last_ms: last_invocation_ms.map(|last| now_ms.saturating_sub(last)),
        };
        (kind, stats)
      })
      .collect()
  }
}

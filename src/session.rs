// 该文件是 Saomiao （扫描） 项目的一部分。
// src/session.rs - 扫描会话
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

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregator::{AggregatedItem, ItemAggregator, ItemObserver};
use crate::config::{ConfigError, SessionConfig};
use crate::detection::{DetectorSet, DetectorType, Frame};
use crate::throttle::ThrottleHelper;
use crate::tracker::ObjectTracker;

#[cfg(feature = "thumbnail")]
use crate::thumbnail::ThumbnailCache;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
  #[error("扫描会话未启动")]
  NotRunning,
}

/// 单帧处理摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
  pub timestamp_ms: i64,
  pub detections: usize,
  pub track_events: usize,
  pub active_tracks: usize,
  pub confirmed_tracks: usize,
  /// 本帧新建或更新的物品数
  pub items_touched: usize,
  pub items_finalized: usize,
  pub thumbnails_captured: usize,
}

/// 扫描会话：持有节流器、跟踪器、聚合器与缩略图缓存
///
/// 同一会话的所有状态只在处理线程上修改。`stop()` 丢弃全部状态，
/// 之后不会再向观察者发出任何事件。
pub struct ScanSession<O: ItemObserver> {
  config: SessionConfig,
  throttle: ThrottleHelper,
  tracker: ObjectTracker,
  aggregator: ItemAggregator,
  #[cfg(feature = "thumbnail")]
  thumbnails: ThumbnailCache,
  observer: O,
  running: bool,
}

impl<O: ItemObserver> ScanSession<O> {
  pub fn new(config: SessionConfig, observer: O) -> Result<Self, ConfigError> {
    config.validate()?;
    let throttle = ThrottleHelper::from_config(&config.throttle)
      .map_err(|e| ConfigError::InvalidArgument(e.to_string()))?;

    Ok(Self {
      throttle,
      tracker: ObjectTracker::new(config.tracker.clone()),
      aggregator: ItemAggregator::new(config.aggregator.clone()),
      #[cfg(feature = "thumbnail")]
      thumbnails: ThumbnailCache::new(config.thumbnail_capacity),
      observer,
      running: false,
      config,
    })
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  fn discard(&mut self) {
    self.throttle.reset_all();
    self.tracker.reset();
    self.aggregator.reset();
    #[cfg(feature = "thumbnail")]
    self.thumbnails.clear();
  }

  /// 开始新的扫描会话，之前的状态全部丢弃
  pub fn start(&mut self) {
    self.discard();
    self.running = true;
    info!("扫描会话开始");
  }

  pub fn stop(&mut self) {
    if !self.running {
      return;
    }
    info!(
      "扫描会话结束，丢弃 {} 条轨迹与 {} 个物品",
      self.tracker.track_count(),
      self.aggregator.len()
    );
    self.discard();
    self.running = false;
  }

  /// 询问本帧哪些检测器可以运行，被放行的检测器同时记录为已调用
  pub fn admit(&self, now_ms: i64) -> DetectorSet {
    if !self.running {
      return DetectorSet::empty();
    }
    DetectorType::ALL
      .into_iter()
      .filter(|kind| self.throttle.try_invoke(*kind, now_ms))
      .collect()
  }

  pub fn process_frame(&mut self, frame: Frame) -> Result<FrameSummary, SessionError> {
    if !self.running {
      return Err(SessionError::NotRunning);
    }

    let timestamp_ms = frame.timestamp_ms;
    let update = self
      .tracker
      .process_frame(timestamp_ms, &frame.detections, frame.detectors_run());
    let items_touched =
      self
        .aggregator
        .ingest(timestamp_ms, self.tracker.confirmed_tracks(), &mut self.observer);
    for (from, to) in self.aggregator.take_merges() {
      debug!("物品 {} 并入物品 {}", from, to);
      #[cfg(feature = "thumbnail")]
      self.thumbnails.rekey(from, to);
    }
    let items_finalized = self
      .aggregator
      .finalize(timestamp_ms, &update.expired, &mut self.observer);

    #[cfg(feature = "thumbnail")]
    let thumbnails_captured = self.capture_thumbnails(&frame, &update.matched);
    #[cfg(not(feature = "thumbnail"))]
    let thumbnails_captured = 0;

    let summary = FrameSummary {
      timestamp_ms,
      detections: frame.detections.len(),
      track_events: update.events.len(),
      active_tracks: self.tracker.track_count(),
      confirmed_tracks: self.tracker.confirmed_tracks().count(),
      items_touched,
      items_finalized,
      thumbnails_captured,
    };
    debug!("帧处理完成: {:?}", summary);
    Ok(summary)
  }

  #[cfg(feature = "thumbnail")]
  fn capture_thumbnails(&mut self, frame: &Frame, matched: &[u64]) -> usize {
    use crate::geometry;
    use crate::thumbnail;

    let Some(image) = frame.image.as_deref() else {
      return 0;
    };
    if self.thumbnails.capacity() == 0 {
      return 0;
    }
    let padding = self.config.thumbnail_padding;

    let mut captured = 0;
    for &track_id in matched {
      let Some(track) = self.tracker.track(track_id) else {
        continue;
      };
      if !track.is_confirmed() {
        continue;
      }
      let bbox = track.bbox();
      let crop = geometry::upright_to_bitmap_crop(&bbox, image.width(), image.height(), padding);
      if crop.width() <= 0 || crop.height() <= 0 {
        continue;
      }
      if !self.aggregator.record_thumbnail(
        track_id,
        track.detector(),
        crop,
        track.last_confidence(),
        frame.timestamp_ms,
      ) {
        continue;
      }
      let Some(item_id) = self.aggregator.resolve(track_id) else {
        continue;
      };
      let Some((_, thumb)) = thumbnail::crop_thumbnail(image, &bbox, padding) else {
        continue;
      };

      let rotation = track.rotation();
      let (sensor_width, sensor_height) = if rotation.swaps_axes() {
        (image.height(), image.width())
      } else {
        (image.width(), image.height())
      };
      let info = geometry::generate_correlation_debug_info(
        &bbox,
        rotation,
        sensor_width,
        sensor_height,
        image.width(),
        image.height(),
        padding,
      );
      debug!("物品 {} 缩略图坐标对应: {:?}", item_id, info);

      self.thumbnails.insert(item_id, thumb);
      captured += 1;
    }
    captured
  }

  pub fn items(&self) -> impl Iterator<Item = &AggregatedItem> {
    self.aggregator.items()
  }

  pub fn item(&self, id: u64) -> Option<&AggregatedItem> {
    self.aggregator.item(id)
  }

  pub fn tracker(&self) -> &ObjectTracker {
    &self.tracker
  }

  pub fn aggregator(&self) -> &ItemAggregator {
    &self.aggregator
  }

  pub fn throttle(&self) -> &ThrottleHelper {
    &self.throttle
  }

  #[cfg(feature = "thumbnail")]
  pub fn thumbnails(&self) -> &ThumbnailCache {
    &self.thumbnails
  }

  #[cfg(feature = "thumbnail")]
  pub fn thumbnails_mut(&mut self) -> &mut ThumbnailCache {
    &mut self.thumbnails
  }

  pub fn observer(&self) -> &O {
    &self.observer
  }

  pub fn observer_mut(&mut self) -> &mut O {
    &mut self.observer
  }

  pub fn into_observer(self) -> O {
    self.observer
  }
}

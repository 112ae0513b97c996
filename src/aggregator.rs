// 该文件是 Saomiao （扫描） 项目的一部分。
// src/aggregator.rs - 多帧证据聚合
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

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::detection::{Attribute, DetectorType};
use crate::geometry::PixelRect;
use crate::tracker::Track;

mod item;
mod observer;

pub use self::item::{AggregatedItem, ConfidenceTier, Evidence, EvidenceValue};
pub use self::observer::{ItemEvent, ItemObserver};

#[derive(Debug)]
struct Entry {
  item: AggregatedItem,
  /// 仍然存活、向该物品贡献证据的轨迹
  live_tracks: BTreeSet<u64>,
  /// 当前物品框来源轨迹的最近匹配时间
  bbox_seen_ms: i64,
}

/// 将已确认轨迹聚合为物品，按物品 id 做幂等的增量更新
///
/// 物品 id 等于贡献它的最早轨迹 id。与已有物品高度重叠的轨迹
/// 被并入同一物品，而不是产生第二个物品；若确认的轨迹比已有物品更早，
/// 该物品改挂到这条轨迹的 id 下。
#[derive(Debug, Default)]
pub struct ItemAggregator {
  config: AggregatorConfig,
  entries: BTreeMap<u64, Entry>,
  aliases: HashMap<u64, u64>,
  /// 尚未被取走的 (旧物品 id, 新物品 id)
  merges: Vec<(u64, u64)>,
}

impl ItemAggregator {
  pub fn new(config: AggregatorConfig) -> Self {
    Self {
      config,
      entries: BTreeMap::new(),
      aliases: HashMap::new(),
      merges: Vec::new(),
    }
  }

  pub fn config(&self) -> &AggregatorConfig {
    &self.config
  }

  pub fn items(&self) -> impl Iterator<Item = &AggregatedItem> {
    self.entries.values().map(|e| &e.item)
  }

  pub fn item(&self, id: u64) -> Option<&AggregatedItem> {
    self.entries.get(&id).map(|e| &e.item)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// 轨迹所属物品的 id
  pub fn resolve(&self, track_id: u64) -> Option<u64> {
    if let Some(&canonical) = self.aliases.get(&track_id) {
      return Some(canonical);
    }
    self.entries.contains_key(&track_id).then_some(track_id)
  }

  /// 丢弃全部物品，不发出任何事件
  pub fn reset(&mut self) {
    debug!("重置聚合器，丢弃 {} 个物品", self.entries.len());
    self.entries.clear();
    self.aliases.clear();
    self.merges.clear();
  }

  /// 取走自上次调用以来发生的物品改挂记录 (旧 id, 新 id)
  pub fn take_merges(&mut self) -> Vec<(u64, u64)> {
    std::mem::take(&mut self.merges)
  }

  /// 与轨迹重叠最多的未完成物品，重叠相同时取 id 较小者
  fn find_conflict(&self, track: &Track) -> Option<u64> {
    let bbox = track.bbox();
    self
      .entries
      .iter()
      .filter(|(id, entry)| **id != track.id() && !entry.item.finalized)
      .map(|(id, entry)| (*id, entry.item.bbox.iou(&bbox)))
      .filter(|(_, iou)| *iou >= self.config.conflict_iou)
      .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
      .map(|(id, _)| id)
  }

  /// 把物品 `newer` 连同证据、来源轨迹与存活轨迹改挂到更早的 `canonical` 下
  fn adopt(&mut self, newer: u64, canonical: u64) {
    let Some(mut entry) = self.entries.remove(&newer) else {
      return;
    };
    entry.item.id = canonical;
    entry.item.merged_items.insert(newer);
    for target in self.aliases.values_mut() {
      if *target == newer {
        *target = canonical;
      }
    }
    self.aliases.insert(newer, canonical);
    self.entries.insert(canonical, entry);
    self.merges.push((newer, canonical));
  }

  /// 合并本帧所有已确认轨迹，返回被创建或更新的物品数
  pub fn ingest<'a, O>(
    &mut self,
    timestamp_ms: i64,
    tracks: impl IntoIterator<Item = &'a Track>,
    observer: &mut O,
  ) -> usize
  where
    O: ItemObserver + ?Sized,
  {
    let mut tracks: Vec<&Track> = tracks.into_iter().filter(|t| t.is_confirmed()).collect();
    tracks.sort_by_key(|t| t.id());

    let mut touched = 0;
    for track in tracks {
      let id = track.id();
      let (canonical, created, adopted) = if let Some(&canonical) = self.aliases.get(&id) {
        (canonical, false, false)
      } else if self.entries.contains_key(&id) {
        (id, false, false)
      } else if let Some(existing) = self.find_conflict(track) {
        if existing < id {
          info!("轨迹 {} 与物品 {} 重叠，合并为同一物品", id, existing);
          self.aliases.insert(id, existing);
          (existing, false, false)
        } else {
          info!("轨迹 {} 早于重叠的物品 {}，物品改挂为 {}", id, existing, id);
          self.adopt(existing, id);
          (id, false, true)
        }
      } else {
        let entry = Entry {
          item: AggregatedItem::new(id, track.smoothed_bbox(), timestamp_ms),
          live_tracks: BTreeSet::new(),
          bbox_seen_ms: i64::MIN,
        };
        self.entries.insert(id, entry);
        (id, true, false)
      };

      let Some(entry) = self.entries.get_mut(&canonical) else {
        continue;
      };
      if entry.item.finalized {
        continue;
      }

      entry.live_tracks.insert(id);
      let mut changed = entry.item.source_tracks.insert(id) || adopted;
      // 物品框跟随最近被看到的来源轨迹，同一帧内以主轨迹为准
      let seen = track.last_seen_ms();
      if seen > entry.bbox_seen_ms || (canonical == id && seen == entry.bbox_seen_ms) {
        entry.bbox_seen_ms = seen;
        let bbox = track.smoothed_bbox();
        if bbox != entry.item.bbox {
          entry.item.bbox = bbox;
          changed = true;
        }
      }
      for observation in track.evidence() {
        changed |= entry
          .item
          .merge_evidence(Evidence::from_observation(observation, id));
      }

      if created {
        entry.item.refresh(&self.config);
        info!(
          "新物品 {}: {:?} ({:?})",
          canonical, entry.item.label, entry.item.tier
        );
        observer.on_item_created(&entry.item);
        touched += 1;
      } else if changed {
        entry.item.refresh(&self.config);
        entry.item.updated_at_ms = timestamp_ms;
        observer.on_item_updated(&entry.item);
        touched += 1;
      }
    }

    touched
  }

  /// 处理过期轨迹：物品的所有来源轨迹都过期后将其标记为最终状态
  pub fn finalize<O>(&mut self, timestamp_ms: i64, expired: &[Track], observer: &mut O) -> usize
  where
    O: ItemObserver + ?Sized,
  {
    let mut finalized = 0;
    for track in expired {
      let id = track.id();
      let canonical = self.aliases.remove(&id).unwrap_or(id);
      let Some(entry) = self.entries.get_mut(&canonical) else {
        continue;
      };
      entry.live_tracks.remove(&id);
      if entry.live_tracks.is_empty() && !entry.item.finalized {
        entry.item.finalized = true;
        entry.item.updated_at_ms = timestamp_ms;
        info!("物品 {} 已完成", canonical);
        observer.on_item_finalized(&entry.item);
        finalized += 1;
      }
    }
    finalized
  }

  /// 记录缩略图证据，只有置信度优于现有缩略图时才会替换
  ///
  /// 返回是否被采用；调用方据此决定是否更新缩略图缓存。
  pub fn record_thumbnail(
    &mut self,
    track_id: u64,
    detector: DetectorType,
    crop: PixelRect,
    confidence: f32,
    timestamp_ms: i64,
  ) -> bool {
    let Some(canonical) = self.resolve(track_id) else {
      return false;
    };
    let Some(entry) = self.entries.get_mut(&canonical) else {
      return false;
    };
    if entry.item.finalized {
      return false;
    }

    let candidate = Evidence {
      attribute: Attribute::Thumbnail,
      value: EvidenceValue::Crop(crop),
      confidence,
      detector,
      source_track: track_id,
      timestamp_ms,
    };
    if let Some(current) = entry.item.thumbnail() {
      if !candidate.supersedes(current) {
        return false;
      }
    }
    entry
      .item
      .evidence
      .retain(|e| e.attribute != Attribute::Thumbnail);
    entry.item.evidence.push(candidate);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::TrackerConfig;
  use crate::detection::{DetectorSet, RawDetection};
  use crate::tracker::{ObjectTracker, TrackState};

  fn confirm(tracker: &mut ObjectTracker, detections: &[RawDetection], start: i64) -> i64 {
    let mut ts = start;
    for _ in 0..3 {
      let dets: Vec<_> = detections
        .iter()
        .cloned()
        .map(|mut d| {
          d.timestamp_ms = ts;
          d
        })
        .collect();
      tracker.process_frame(ts, &dets, DetectorSet::all());
      ts += 33;
    }
    ts
  }

  #[test]
  fn upsert_is_idempotent() {
    let mut tracker = ObjectTracker::default();
    let mut aggregator = ItemAggregator::default();
    let mut events: Vec<ItemEvent> = Vec::new();
    confirm(&mut tracker, &[RawDetection::object("lamp", [0.1, 0.1, 0.4, 0.4], 0.9, 0)], 0);

    aggregator.ingest(66, tracker.confirmed_tracks(), &mut events);
    aggregator.ingest(66, tracker.confirmed_tracks(), &mut events);
    assert_eq!(aggregator.len(), 1);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ItemEvent::Created(_)));
    let item = aggregator.item(1).unwrap();
    assert_eq!(item.label.as_deref(), Some("lamp"));
    assert_eq!(item.tier, ConfidenceTier::High);
  }

  #[test]
  fn overlapping_tracks_of_different_detectors_merge_into_older_item() {
    let mut tracker = ObjectTracker::default();
    let mut aggregator = ItemAggregator::default();
    let mut events: Vec<ItemEvent> = Vec::new();
    confirm(
      &mut tracker,
      &[
        RawDetection::object("cereal box", [0.2, 0.2, 0.6, 0.7], 0.6, 0),
        RawDetection::barcode("5000159484695", [0.22, 0.2, 0.6, 0.7], 0.95, 0),
      ],
      0,
    );
    assert_eq!(tracker.confirmed_tracks().count(), 2);

    aggregator.ingest(66, tracker.confirmed_tracks(), &mut events);
    assert_eq!(aggregator.len(), 1);
    let item = aggregator.item(1).unwrap();
    assert_eq!(item.label.as_deref(), Some("cereal box"));
    assert_eq!(item.barcode.as_deref(), Some("5000159484695"));
    assert_eq!(item.source_tracks, BTreeSet::from([1, 2]));
    assert_eq!(aggregator.resolve(2), Some(1));
    assert_eq!(events.iter().filter(|e| e.kind() == "created").count(), 1);
  }

  #[test]
  fn older_track_confirming_late_takes_over_newer_item() {
    let mut tracker = ObjectTracker::default();
    let mut aggregator = ItemAggregator::default();
    let mut events: Vec<ItemEvent> = Vec::new();
    let object = |ts: i64| RawDetection::object("kettle", [0.3, 0.3, 0.6, 0.6], 0.8, ts);
    let barcode = |ts: i64| RawDetection::barcode("4006381333931", [0.3, 0.3, 0.6, 0.6], 0.95, ts);

    for ts in [0, 33] {
      tracker.process_frame(ts, &[object(ts), barcode(ts)], DetectorSet::all());
      aggregator.ingest(ts, tracker.confirmed_tracks(), &mut events);
    }
    // 物体检测器运行了但漏检，条码轨迹先确认
    tracker.process_frame(66, &[barcode(66)], DetectorSet::all());
    aggregator.ingest(66, tracker.confirmed_tracks(), &mut events);
    assert!(aggregator.item(2).is_some());

    for ts in [99, 132] {
      tracker.process_frame(ts, &[object(ts), barcode(ts)], DetectorSet::all());
      aggregator.ingest(ts, tracker.confirmed_tracks(), &mut events);
    }
    assert_eq!(tracker.confirmed_tracks().count(), 2);
    assert_eq!(aggregator.len(), 1);
    assert!(aggregator.item(2).is_none());
    let item = aggregator.item(1).unwrap();
    assert_eq!(item.id, 1);
    assert_eq!(item.label.as_deref(), Some("kettle"));
    assert_eq!(item.barcode.as_deref(), Some("4006381333931"));
    assert_eq!(item.source_tracks, BTreeSet::from([1, 2]));
    assert_eq!(item.merged_items, BTreeSet::from([2]));
    assert_eq!(item.created_at_ms, 66);
    assert_eq!(aggregator.resolve(2), Some(1));

    assert_eq!(events.iter().filter(|e| e.kind() == "created").count(), 1);
    assert!(matches!(events.last(), Some(ItemEvent::Updated(item)) if item.id == 1));
    assert_eq!(aggregator.take_merges(), vec![(2, 1)]);
    assert!(aggregator.take_merges().is_empty());
  }

  #[test]
  fn item_box_follows_aliased_track_after_main_track_is_lost() {
    let mut tracker = ObjectTracker::new(TrackerConfig::default().with_max_missed_frames(2));
    let mut aggregator = ItemAggregator::default();
    let object = |ts: i64| RawDetection::object("parcel", [0.2, 0.2, 0.5, 0.5], 0.8, ts);
    let barcode = |ts: i64, shift: f32| {
      RawDetection::barcode("123456", [0.2 + shift, 0.2, 0.5 + shift, 0.5], 0.9, ts)
    };
    for ts in [0, 33, 66] {
      tracker.process_frame(ts, &[object(ts), barcode(ts, 0.0)], DetectorSet::all());
    }
    aggregator.ingest(66, tracker.confirmed_tracks(), &mut ());
    assert_eq!(aggregator.len(), 1);
    assert_eq!(aggregator.resolve(2), Some(1));
    let before = aggregator.item(1).unwrap().bbox;

    // 物体检测持续漏检，条码轨迹继续向右移动
    let mut ts = 66;
    for step in 1..=4 {
      ts += 33;
      let shift = 0.02 * step as f32;
      tracker.process_frame(ts, &[barcode(ts, shift)], DetectorSet::all());
      aggregator.ingest(ts, tracker.confirmed_tracks(), &mut ());
    }
    assert_eq!(tracker.track(1).unwrap().state(), TrackState::Lost);
    let item = aggregator.item(1).unwrap();
    assert_eq!(item.bbox, tracker.track(2).unwrap().smoothed_bbox());
    assert!(item.bbox.left() > before.left());
  }

  #[test]
  fn item_is_finalized_after_all_sources_expire() {
    let config = TrackerConfig::default()
      .with_max_missed_frames(1)
      .with_lost_timeout_ms(0);
    let mut tracker = ObjectTracker::new(config);
    let mut aggregator = ItemAggregator::default();
    let mut events: Vec<ItemEvent> = Vec::new();
    let ts = confirm(&mut tracker, &[RawDetection::object("chair", [0.1, 0.1, 0.4, 0.4], 0.7, 0)], 0);
    aggregator.ingest(ts, tracker.confirmed_tracks(), &mut events);

    let update = tracker.process_frame(ts + 33, &[], DetectorSet::all());
    assert_eq!(update.expired.len(), 1);
    assert_eq!(aggregator.finalize(ts + 33, &update.expired, &mut events), 1);

    let item = aggregator.item(1).unwrap();
    assert!(item.finalized);
    assert!(matches!(events.last(), Some(ItemEvent::Finalized(_))));
    // 已完成的物品不会被删除
    assert_eq!(aggregator.len(), 1);
  }

  #[test]
  fn unconfirmed_expired_tracks_are_ignored() {
    let mut aggregator = ItemAggregator::default();
    let mut tracker = ObjectTracker::new(
      TrackerConfig::default()
        .with_max_missed_frames(1)
        .with_lost_timeout_ms(0),
    );
    tracker.process_frame(0, &[RawDetection::object("pen", [0.1, 0.1, 0.2, 0.2], 0.4, 0)], DetectorSet::all());
    let update = tracker.process_frame(33, &[], DetectorSet::all());
    assert_eq!(aggregator.finalize(33, &update.expired, &mut ()), 0);
    assert!(aggregator.is_empty());
  }

  #[test]
  fn thumbnail_is_replaced_only_by_better_confidence() {
    let mut tracker = ObjectTracker::default();
    let mut aggregator = ItemAggregator::default();
    confirm(&mut tracker, &[RawDetection::object("vase", [0.1, 0.1, 0.4, 0.4], 0.7, 0)], 0);
    aggregator.ingest(66, tracker.confirmed_tracks(), &mut ());

    let crop = PixelRect::new(0, 0, 10, 10);
    assert!(aggregator.record_thumbnail(1, DetectorType::Object, crop, 0.7, 66));
    assert!(!aggregator.record_thumbnail(1, DetectorType::Object, crop, 0.5, 99));
    assert!(aggregator.record_thumbnail(1, DetectorType::Object, crop, 0.9, 132));
    let item = aggregator.item(1).unwrap();
    assert_eq!(item.thumbnail().unwrap().confidence, 0.9);
    assert_eq!(
      item.evidence.iter().filter(|e| e.attribute == Attribute::Thumbnail).count(),
      1
    );
    assert!(!aggregator.record_thumbnail(42, DetectorType::Object, crop, 1.0, 132));
  }

  #[test]
  fn reset_discards_items_silently() {
    let mut tracker = ObjectTracker::default();
    let mut aggregator = ItemAggregator::default();
    let mut events: Vec<ItemEvent> = Vec::new();
    confirm(&mut tracker, &[RawDetection::object("lamp", [0.1, 0.1, 0.4, 0.4], 0.9, 0)], 0);
    aggregator.ingest(66, tracker.confirmed_tracks(), &mut events);
    aggregator.reset();
    assert!(aggregator.is_empty());
    assert_eq!(events.len(), 1);
  }
}

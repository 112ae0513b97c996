// 该文件是 Saomiao （扫描） 项目的一部分。
// tests/scan_session.rs - 扫描会话端到端测试
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

mod common;

use std::io::Cursor;
use std::thread;

use common::scene::{FRAME_PERIOD_MS, empty_frames, replay_line, steady_frames};
use saomiao::aggregator::{ConfidenceTier, ItemEvent};
use saomiao::config::{SessionConfig, TrackerConfig};
use saomiao::detection::{Frame, RawDetection};
use saomiao::input::ReplayInput;
use saomiao::output::JsonLinesOutput;
use saomiao::pipeline::{self, HandoffError};
use saomiao::session::ScanSession;
use saomiao::task::{ContinuousTask, Task};
use saomiao::tracker::TrackState;

fn session_with(config: SessionConfig) -> ScanSession<Vec<ItemEvent>> {
  let mut session = ScanSession::new(config, Vec::new()).unwrap();
  session.start();
  session
}

fn created(events: &[ItemEvent]) -> usize {
  events.iter().filter(|e| matches!(e, ItemEvent::Created(_))).count()
}

#[test]
fn overlapping_detections_become_one_track_and_one_item() {
  let mut session = session_with(SessionConfig::default());
  let template = [RawDetection::object("backpack", [0.2, 0.3, 0.5, 0.8], 0.75, 0)];
  for frame in steady_frames(&template, 8, 0, 0.01) {
    session.process_frame(frame).unwrap();
  }

  assert_eq!(session.tracker().track_count(), 1);
  assert_eq!(session.items().count(), 1);
  assert_eq!(created(session.observer()), 1);
  let item = session.item(1).unwrap();
  assert_eq!(item.label.as_deref(), Some("backpack"));
  assert_eq!(item.tier, ConfidenceTier::Medium);
}

#[test]
fn missed_frames_mark_track_lost_and_leave_aggregation_set() {
  let config = SessionConfig::default().with_tracker(TrackerConfig::default().with_max_missed_frames(3));
  let mut session = session_with(config);
  let template = [RawDetection::object("plant", [0.4, 0.4, 0.6, 0.6], 0.9, 0)];
  let frames = steady_frames(&template, 3, 0, 0.0);
  let next = frames.len() as i64 * FRAME_PERIOD_MS;
  for frame in frames {
    session.process_frame(frame).unwrap();
  }
  assert_eq!(session.tracker().confirmed_tracks().count(), 1);

  let mut empties = empty_frames(4, next).into_iter();
  for frame in empties.by_ref().take(3) {
    session.process_frame(frame).unwrap();
  }
  assert_eq!(session.tracker().track(1).unwrap().state(), TrackState::Lost);

  let updates_before = session.observer().len();
  let summary = session.process_frame(empties.next().unwrap()).unwrap();
  assert_eq!(summary.confirmed_tracks, 0);
  assert_eq!(summary.items_touched, 0);
  assert_eq!(session.observer().len(), updates_before);
}

#[test]
fn lost_track_recovers_before_expiry() {
  let config = SessionConfig::default().with_tracker(TrackerConfig::default().with_max_missed_frames(2));
  let mut session = session_with(config);
  let template = [RawDetection::object("guitar", [0.1, 0.1, 0.3, 0.9], 0.85, 0)];
  for frame in steady_frames(&template, 3, 0, 0.0) {
    session.process_frame(frame).unwrap();
  }
  for frame in empty_frames(2, 99) {
    session.process_frame(frame).unwrap();
  }
  assert_eq!(session.tracker().track(1).unwrap().state(), TrackState::Lost);

  for frame in steady_frames(&template, 3, 200, 0.0) {
    session.process_frame(frame).unwrap();
  }
  let track = session.tracker().track(1).unwrap();
  assert_eq!(track.state(), TrackState::Confirmed);
  assert_eq!(session.tracker().diagnostics().recovered, 1);
  assert_eq!(session.items().count(), 1);
}

#[test]
fn expired_item_is_finalized_once() {
  let tracker = TrackerConfig::default()
    .with_max_missed_frames(1)
    .with_lost_timeout_ms(100);
  let mut session = session_with(SessionConfig::default().with_tracker(tracker));
  let template = [RawDetection::document("RECEIPT #42", [0.1, 0.5, 0.9, 0.95], 0.65, 0)];
  for frame in steady_frames(&template, 3, 0, 0.0) {
    session.process_frame(frame).unwrap();
  }
  for frame in empty_frames(10, 99) {
    session.process_frame(frame).unwrap();
  }

  let finalized: Vec<_> = session
    .observer()
    .iter()
    .filter(|e| matches!(e, ItemEvent::Finalized(_)))
    .collect();
  assert_eq!(finalized.len(), 1);
  let item = finalized[0].item();
  assert!(item.finalized);
  assert_eq!(item.ocr_text.as_deref(), Some("RECEIPT #42"));
  // 完成后物品依旧保留
  assert!(session.item(1).unwrap().finalized);
  assert_eq!(session.tracker().track_count(), 0);
}

#[test]
fn barcode_and_object_on_same_item_are_merged() {
  let mut session = session_with(SessionConfig::default());
  let template = [
    RawDetection::object("shampoo", [0.3, 0.2, 0.5, 0.7], 0.55, 0),
    RawDetection::barcode("8710103929817", [0.31, 0.2, 0.5, 0.7], 0.97, 0),
  ];
  for frame in steady_frames(&template, 4, 0, 0.0) {
    session.process_frame(frame).unwrap();
  }
  assert_eq!(session.tracker().track_count(), 2);
  assert_eq!(session.items().count(), 1);
  let item = session.item(1).unwrap();
  assert_eq!(item.barcode.as_deref(), Some("8710103929817"));
  assert_eq!(item.label.as_deref(), Some("shampoo"));
  assert_eq!(created(session.observer()), 1);
}

#[test]
fn replay_log_drives_session_into_json_lines_output() {
  let template = [
    RawDetection::object("lamp", [0.05, 0.05, 0.25, 0.45], 0.9, 0),
    RawDetection::barcode("9780201633610", [0.6, 0.6, 0.7, 0.65], 0.99, 0),
  ];
  let mut log = String::new();
  for frame in steady_frames(&template, 6, 0, 0.0) {
    log.push_str(&replay_line(&frame));
    log.push('\n');
  }
  log.push_str("{ broken\n");

  let mut input = ReplayInput::from_reader(Cursor::new(log.into_bytes()));
  let mut session = ScanSession::new(SessionConfig::default(), JsonLinesOutput::new(Vec::new())).unwrap();
  let report = ContinuousTask::default()
    .run_task(input.by_ref(), &mut session)
    .unwrap();
  assert_eq!(report.frames, 6);
  assert_eq!(input.skipped(), 1);

  let output = session.into_observer();
  assert_eq!(output.failures(), 0);
  let text = String::from_utf8(output.into_inner()).unwrap();
  let events: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
  let created: Vec<_> = events.iter().filter(|e| e["event"] == "created").collect();
  assert_eq!(created.len(), 2);
  assert!(created.iter().any(|e| e["item"]["label"] == "lamp"));
  assert!(created.iter().any(|e| e["item"]["barcode"] == "9780201633610"));
}

#[test]
fn handoff_applies_backpressure_to_the_camera_thread() {
  let (tx, rx) = pipeline::handoff();
  let template = [RawDetection::object("chair", [0.2, 0.2, 0.6, 0.9], 0.8, 0)];
  let frames = steady_frames(&template, 20, 0, 0.0);

  let consumer = thread::spawn(move || {
    let mut session = session_with(SessionConfig::default());
    let mut processed = 0;
    for frame in rx {
      session.process_frame(frame).unwrap();
      processed += 1;
    }
    (processed, session.items().count())
  });

  let mut accepted = 0;
  for frame in frames {
    match tx.offer(frame) {
      Ok(()) => accepted += 1,
      Err(HandoffError::Busy(frame)) => {
        // 背压：改为阻塞等待，保证测试结果确定
        tx.send(frame).unwrap();
        accepted += 1;
      }
      Err(HandoffError::Closed(_)) => panic!("consumer closed early"),
    }
  }
  let rejected = tx.rejected();
  drop(tx);

  let (processed, items) = consumer.join().unwrap();
  assert_eq!(processed, accepted);
  assert_eq!(processed, 20);
  assert_eq!(items, 1);
  assert!(rejected <= 20);
}

#[test]
fn stale_frame_does_not_disturb_tracks() {
  let mut session = session_with(SessionConfig::default());
  let template = [RawDetection::object("cup", [0.1, 0.1, 0.2, 0.2], 0.9, 0)];
  for frame in steady_frames(&template, 3, 1000, 0.0) {
    session.process_frame(frame).unwrap();
  }
  let stale = Frame::new(10).with_detections(vec![RawDetection::object("cup", [0.7, 0.7, 0.8, 0.8], 0.9, 10)]);
  let summary = session.process_frame(stale).unwrap();
  assert_eq!(summary.track_events, 0);
  assert_eq!(session.tracker().track_count(), 1);
  assert_eq!(session.tracker().diagnostics().stale_frames, 1);
}

#[test]
fn older_track_confirming_after_newer_overlap_keeps_one_item() {
  let mut session = session_with(SessionConfig::default());
  let object = |ts: i64| RawDetection::object("toolbox", [0.25, 0.3, 0.65, 0.7], 0.8, ts);
  let barcode = |ts: i64| RawDetection::barcode("0715141514", [0.25, 0.3, 0.65, 0.7], 0.96, ts);

  for ts in [0, 33] {
    session
      .process_frame(Frame::new(ts).with_detections(vec![object(ts), barcode(ts)]))
      .unwrap();
  }
  // 物体检测器本帧漏检，条码轨迹抢先确认并产生物品
  session
    .process_frame(Frame::new(66).with_detections(vec![barcode(66)]))
    .unwrap();
  assert_eq!(session.items().count(), 1);
  assert!(session.item(2).is_some());

  for ts in [99, 132] {
    session
      .process_frame(Frame::new(ts).with_detections(vec![object(ts), barcode(ts)]))
      .unwrap();
  }
  assert_eq!(session.tracker().confirmed_tracks().count(), 2);
  assert_eq!(session.items().count(), 1);
  assert_eq!(created(session.observer()), 1);
  assert!(session.item(2).is_none());
  let item = session.item(1).unwrap();
  assert_eq!(item.label.as_deref(), Some("toolbox"));
  assert_eq!(item.barcode.as_deref(), Some("0715141514"));
  assert!(item.merged_items.contains(&2));

  // 两条轨迹都过期后只完成一个物品
  let mut ts = 165;
  while ts <= 4_000 {
    session.process_frame(Frame::new(ts)).unwrap();
    ts += FRAME_PERIOD_MS;
  }
  let finalized: Vec<u64> = session
    .observer()
    .iter()
    .filter(|e| matches!(e, ItemEvent::Finalized(_)))
    .map(|e| e.item().id)
    .collect();
  assert_eq!(finalized, vec![1]);
}

#[test]
fn frames_without_detections_age_tracks_until_item_is_finalized() {
  let mut session = session_with(SessionConfig::default());
  let template = [RawDetection::object("umbrella", [0.3, 0.1, 0.5, 0.9], 0.85, 0)];
  for frame in steady_frames(&template, 3, 0, 0.0) {
    session.process_frame(frame).unwrap();
  }
  assert_eq!(session.tracker().confirmed_tracks().count(), 1);

  let mut lost_at = None;
  let mut ts = 3 * FRAME_PERIOD_MS;
  while ts <= 5_000 {
    session
      .process_frame(Frame::new(ts).with_detections(vec![]))
      .unwrap();
    let lost = session
      .tracker()
      .track(1)
      .is_some_and(|t| t.state() == TrackState::Lost);
    if lost && lost_at.is_none() {
      lost_at = Some(ts);
    }
    ts += FRAME_PERIOD_MS;
  }

  // 最后一次匹配在 66 ms，连续 5 帧无检测后丢失
  assert_eq!(lost_at, Some(66 + 5 * FRAME_PERIOD_MS));
  assert_eq!(session.tracker().track_count(), 0);
  let item = session.item(1).unwrap();
  assert!(item.finalized);
  assert_eq!(
    session
      .observer()
      .iter()
      .filter(|e| matches!(e, ItemEvent::Finalized(_)))
      .count(),
    1
  );
}

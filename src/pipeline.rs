// 该文件是 Saomiao （扫描） 项目的一部分。
// src/pipeline.rs - 相机线程与跟踪线程之间的帧交接
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

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::detection::Frame;

// 同一时刻最多只有一帧等待处理
const FRAMES_IN_FLIGHT: usize = 1;

#[derive(Error, Debug)]
pub enum HandoffError {
  #[error("跟踪线程繁忙，帧 {} 未被接收", .0.timestamp_ms)]
  Busy(Frame),
  #[error("跟踪线程已关闭")]
  Closed(Frame),
}

impl HandoffError {
  /// 取回未送达的帧
  pub fn into_frame(self) -> Frame {
    match self {
      HandoffError::Busy(frame) | HandoffError::Closed(frame) => frame,
    }
  }
}

/// 生产端（相机回调一侧）
#[derive(Debug, Clone)]
pub struct FrameSender {
  tx: Sender<Frame>,
  rejected: Arc<AtomicU64>,
}

impl FrameSender {
  /// 非阻塞投递；消费端仍持有未处理的帧时返回 `Busy`，由调用方决定丢弃或重试
  pub fn offer(&self, frame: Frame) -> Result<(), HandoffError> {
    match self.tx.try_send(frame) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(frame)) => {
        let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("帧交接繁忙，累计拒绝 {} 帧", rejected);
        Err(HandoffError::Busy(frame))
      }
      Err(TrySendError::Disconnected(frame)) => Err(HandoffError::Closed(frame)),
    }
  }

  /// 阻塞投递，直到消费端取走上一帧
  pub fn send(&self, frame: Frame) -> Result<(), HandoffError> {
    self
      .tx
      .send(frame)
      .map_err(|e| HandoffError::Closed(e.into_inner()))
  }

  /// 因背压被拒绝的帧数
  pub fn rejected(&self) -> u64 {
    self.rejected.load(Ordering::Relaxed)
  }
}

/// 消费端（跟踪线程一侧），所有生产端关闭后迭代结束
#[derive(Debug)]
pub struct FrameReceiver {
  rx: Receiver<Frame>,
}

impl FrameReceiver {
  pub fn try_recv(&self) -> Option<Frame> {
    self.rx.try_recv().ok()
  }
}

impl Iterator for FrameReceiver {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.rx.recv().ok()
  }
}

pub fn handoff() -> (FrameSender, FrameReceiver) {
  debug!("创建帧交接通道，容量 {}", FRAMES_IN_FLIGHT);
  let (tx, rx) = crossbeam_channel::bounded(FRAMES_IN_FLIGHT);
  (
    FrameSender {
      tx,
      rejected: Arc::new(AtomicU64::new(0)),
    },
    FrameReceiver { rx },
  )
}

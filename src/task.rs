// 该文件是 Saomiao （扫描） 项目的一部分。
// src/task.rs - 帧循环任务
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

use std::{thread, time::Duration};

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::ItemObserver;
use crate::detection::Frame;
use crate::session::ScanSession;

pub trait Task<I, O: ItemObserver>: Sized {
  type Error;
  fn run_task(self, input: I, session: &mut ScanSession<O>) -> Result<TaskReport, Self::Error>;
}

/// 一次任务运行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
  pub frames: usize,
  pub detections: usize,
  /// 因节流被跳过的检测数
  pub throttled: usize,
  pub items_touched: usize,
  pub items_finalized: usize,
  pub interrupted: bool,
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  throttled: bool,
  handle_interrupt: bool,
}

impl ContinuousTask {
  /// 处理指定帧数后退出
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 按会话的节流间隔重新筛选每帧的检测结果，模拟设备上的检测器调度
  pub fn with_throttle(mut self, throttled: bool) -> Self {
    self.throttled = throttled;
    self
  }

  /// 安装 Ctrl-C 处理器，每个进程只能安装一次
  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

fn install_interrupt() -> anyhow::Result<std::sync::mpsc::Receiver<()>> {
  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

impl<I: Iterator<Item = Frame>, O: ItemObserver> Task<I, O> for ContinuousTask {
  type Error = anyhow::Error;

  fn run_task(self, input: I, session: &mut ScanSession<O>) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let interrupt = if self.handle_interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };
    if !session.is_running() {
      session.start();
    }

    let mut report = TaskReport::default();
    let mut now = std::time::Instant::now();
    for mut frame in input {
      report.frames += 1;
      if self.throttled {
        let admitted = session.admit(frame.timestamp_ms);
        let before = frame.detections.len();
        frame
          .detections
          .retain(|d| admitted.contains(d.detector_type()));
        report.throttled += before - frame.detections.len();
        frame.invoked = Some(admitted);
      }

      let summary = session.process_frame(frame)?;
      report.detections += summary.detections;
      report.items_touched += summary.items_touched;
      report.items_finalized += summary.items_finalized;
      info!(
        "第 {} 帧 ({} ms): {} 个检测, {} 条活跃轨迹, 耗时 {:.2?}",
        report.frames,
        summary.timestamp_ms,
        summary.detections,
        summary.active_tracks,
        now.elapsed()
      );
      now = std::time::Instant::now();

      if self.frame_number.is_some_and(|n| report.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", report.frames);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        report.interrupted = true;
        break;
      }
    }

    info!("任务完成，退出");
    Ok(report)
  }
}

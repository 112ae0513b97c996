// 该文件是 Saomiao （扫描） 项目的一部分。
// src/main.rs - 检测日志回放程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use saomiao::{
  FromUrl,
  config::SessionConfig,
  input::ReplayInput,
  output::OutputWrapper,
  session::ScanSession,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = match &args.config {
    Some(path) => SessionConfig::from_json_file(path)?,
    None => SessionConfig::default(),
  };
  let input = ReplayInput::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let mut session = ScanSession::new(config, output)?;

  let frame_number = (args.frame_number > 0).then_some(args.frame_number);
  let report = ContinuousTask::default()
    .with_frame_number(frame_number)
    .with_throttle(args.throttle)
    .with_interrupt(true)
    .run_task(input, &mut session)?;

  info!(
    "共处理 {} 帧, {} 个检测 ({} 个被节流), 当前物品 {} 个",
    report.frames,
    report.detections,
    report.throttled,
    session.items().count()
  );
  for item in session.items() {
    info!(
      "物品 {}: {:?} / {:?} / {:?} ({:?})",
      item.id, item.label, item.barcode, item.ocr_text, item.tier
    );
  }
  let diagnostics = session.tracker().diagnostics().clone();
  info!("跟踪诊断: {:?}", diagnostics);

  session.observer_mut().flush()?;
  session.stop();
  Ok(())
}

// 该文件是 Saomiao （扫描） 项目的一部分。
// src/output.rs - 物品事件输出
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

use std::fs::File;
use std::io::{BufWriter, Write};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::aggregator::{AggregatedItem, ItemObserver};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Record<'a> {
  event: &'static str,
  emitted_at: String,
  item: &'a AggregatedItem,
}

/// 将物品事件逐行写成 JSON
///
/// 观察者回调不能失败，写入错误只记录日志并计数。
#[derive(Debug)]
pub struct JsonLinesOutput<W: Write = BufWriter<File>> {
  writer: W,
  written: usize,
  failures: usize,
}

impl<W: Write> JsonLinesOutput<W> {
  pub fn new(writer: W) -> Self {
    Self {
      writer,
      written: 0,
      failures: 0,
    }
  }

  pub fn written(&self) -> usize {
    self.written
  }

  pub fn failures(&self) -> usize {
    self.failures
  }

  pub fn flush(&mut self) -> Result<(), OutputError> {
    self.writer.flush()?;
    Ok(())
  }

  pub fn into_inner(self) -> W {
    self.writer
  }

  fn write_record(&mut self, event: &'static str, item: &AggregatedItem) -> Result<(), OutputError> {
    let record = Record {
      event,
      emitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      item,
    };
    serde_json::to_writer(&mut self.writer, &record)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }

  fn emit(&mut self, event: &'static str, item: &AggregatedItem) {
    match self.write_record(event, item) {
      Ok(()) => self.written += 1,
      Err(e) => {
        error!("写入物品 {} 的 {} 事件失败: {}", item.id, event, e);
        self.failures += 1;
      }
    }
  }
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    let path = url.path();
    info!("物品事件写入: {}", path);
    let file = File::create(path)?;
    Ok(Self::new(BufWriter::new(file)))
  }
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl<W: Write> ItemObserver for JsonLinesOutput<W> {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    self.emit("created", item);
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    self.emit("updated", item);
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    self.emit("finalized", item);
    // 最终状态尽快落盘
    if let Err(e) = self.writer.flush() {
      error!("刷新输出失败: {}", e);
      self.failures += 1;
    }
  }
}

/// 只把物品事件写入日志
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

fn describe(item: &AggregatedItem) -> String {
  let mut parts = Vec::new();
  if let Some(label) = &item.label {
    parts.push(format!("标签={}", label));
  }
  if let Some(barcode) = &item.barcode {
    parts.push(format!("条码={}", barcode));
  }
  if let Some(text) = &item.ocr_text {
    parts.push(format!("文本={:?}", text));
  }
  parts.push(format!("置信度={:.2} ({:?})", item.confidence, item.tier));
  parts.join(", ")
}

impl ItemObserver for LogOutput {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    info!("[新物品 {}] {}", item.id, describe(item));
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    info!("[更新物品 {}] {}", item.id, describe(item));
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    info!("[完成物品 {}] {}", item.id, describe(item));
  }
}

#[derive(Debug)]
pub enum OutputWrapper {
  JsonLines(JsonLinesOutput),
  Log(LogOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      <JsonLinesOutput as FromUrlWithScheme>::SCHEME => {
        Ok(OutputWrapper::JsonLines(<JsonLinesOutput>::from_url(url)?))
      }
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  pub fn flush(&mut self) -> Result<(), OutputError> {
    match self {
      OutputWrapper::JsonLines(output) => output.flush(),
      OutputWrapper::Log(_) => Ok(()),
    }
  }
}

impl ItemObserver for OutputWrapper {
  fn on_item_created(&mut self, item: &AggregatedItem) {
    match self {
      OutputWrapper::JsonLines(output) => output.on_item_created(item),
      OutputWrapper::Log(output) => output.on_item_created(item),
    }
  }

  fn on_item_updated(&mut self, item: &AggregatedItem) {
    match self {
      OutputWrapper::JsonLines(output) => output.on_item_updated(item),
      OutputWrapper::Log(output) => output.on_item_updated(item),
    }
  }

  fn on_item_finalized(&mut self, item: &AggregatedItem) {
    match self {
      OutputWrapper::JsonLines(output) => output.on_item_finalized(item),
      OutputWrapper::Log(output) => output.on_item_finalized(item),
    }
  }
}

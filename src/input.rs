// 该文件是 Saomiao （扫描） 项目的一部分。
// src/input.rs - 检测日志回放输入
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
use std::io::{BufRead, BufReader};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::detection::Frame;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("输入文件读取错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 每行一个 JSON 编码的 [`Frame`] 的检测日志
///
/// 无法解析的行会被记录并跳过，不会中断回放。
pub struct ReplayInput {
  reader: Box<dyn BufRead + Send>,
  line: usize,
  skipped: usize,
}

impl std::fmt::Debug for ReplayInput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReplayInput")
      .field("line", &self.line)
      .field("skipped", &self.skipped)
      .finish()
  }
}

impl ReplayInput {
  pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
    Self {
      reader: Box::new(reader),
      line: 0,
      skipped: 0,
    }
  }

  /// 已跳过的无效行数
  pub fn skipped(&self) -> usize {
    self.skipped
  }
}

impl FromUrl for ReplayInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      Self::SCHEME => {
        let path = url.path();
        info!("打开检测日志: {}", path);
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
      }
      "stdin" => {
        info!("从标准输入读取检测日志");
        Ok(Self::from_reader(BufReader::new(std::io::stdin())))
      }
      other => {
        error!(
          "URI scheme mismatch: expected '{}', found '{}'",
          Self::SCHEME,
          other
        );
        Err(InputError::SchemeMismatch(other.to_string()))
      }
    }
  }
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "jsonl";
}

impl Iterator for ReplayInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let mut buf = String::new();
    loop {
      buf.clear();
      match self.reader.read_line(&mut buf) {
        Ok(0) => return None,
        Ok(_) => {}
        Err(e) => {
          error!("读取检测日志失败: {}", e);
          return None;
        }
      }
      self.line += 1;
      let text = buf.trim();
      if text.is_empty() || text.starts_with('#') {
        continue;
      }
      match serde_json::from_str::<Frame>(text) {
        Ok(frame) => return Some(frame),
        Err(e) => {
          warn!("跳过第 {} 行: {}", self.line, e);
          self.skipped += 1;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;
  use crate::detection::{DetectionPayload, DetectorType};

  const LOG: &str = r#"
# replay header
{"timestamp_ms": 0, "invoked": ["object", "barcode"], "detections": [{"payload": {"type": "object", "label": "cup"}, "bbox": [0.1, 0.1, 0.3, 0.4], "confidence": 0.8, "timestamp_ms": 0}]}
not json
{"timestamp_ms": 33, "invoked": [], "detections": [{"payload": {"type": "barcode", "value": "42", "format": "ean13"}, "bbox": [0.5, 0.5, 0.6, 0.6], "confidence": 0.9, "timestamp_ms": 33, "rotation_degrees": 90}]}
"#;

  #[test]
  fn reads_frames_and_skips_bad_lines() {
    let mut input = ReplayInput::from_reader(Cursor::new(LOG.as_bytes().to_vec()));
    let frames: Vec<Frame> = input.by_ref().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(input.skipped(), 1);

    assert!(frames[0].detectors_run().contains(DetectorType::Barcode));
    assert!(matches!(
      &frames[0].detections[0].payload,
      DetectionPayload::Object { label } if label == "cup"
    ));
    assert_eq!(frames[1].detections[0].rotation_degrees, 90);
    assert_eq!(frames[1].detections[0].detector_type(), DetectorType::Barcode);
  }

  #[test]
  fn rejects_unknown_scheme() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      ReplayInput::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn missing_file_is_io_error() {
    let url = Url::parse("jsonl:///nonexistent/saomiao/replay.jsonl").unwrap();
    assert!(matches!(ReplayInput::from_url(&url), Err(InputError::Io(_))));
  }
}

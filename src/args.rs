// 该文件是 Saomiao （扫描） 项目的一部分。
// src/args.rs - 回放程序参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Saomiao 检测日志回放
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测日志来源
  /// 支持格式:
  /// - 文件: jsonl:///path/to/frames.jsonl
  /// - 标准输入: stdin:-
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 物品事件输出
  /// 支持格式:
  /// - 文件: jsonl:///path/to/items.jsonl
  /// - 日志: log:stdout
  #[arg(long, value_name = "OUTPUT", default_value = "log:stdout")]
  pub output: Url,

  /// JSON 配置文件，缺省使用内置参数
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 按节流间隔重新调度检测器
  #[arg(long, default_value_t = false)]
  pub throttle: bool,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

// 该文件是 DarkPlate 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use darkplate::{config, input::VideoBackend, output::FourCc};

/// DarkPlate 车牌识别参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待处理的视频文件，依次处理
  #[arg(value_name = "FILES")]
  pub files: Vec<PathBuf>,

  /// 优先查找 DarkPlate.cfg 的目录（之后再查找内置的相对目录）
  #[arg(long, value_name = "DIR")]
  pub nn_dir: Option<PathBuf>,

  /// 输出视频所在目录
  #[arg(long, default_value = ".", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = config::DEFAULT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = config::DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 车牌类别在 names 文件中的编号
  #[arg(long, default_value_t = config::DEFAULT_PLATE_CLASS, value_name = "INDEX")]
  pub plate_class: usize,

  /// 视频编解码后端
  #[arg(long, value_enum, default_value_t = VideoBackend::Ffmpeg)]
  pub backend: VideoBackend,

  /// 输出视频的 FourCC 编码
  #[arg(long, default_value = "mp4v", value_name = "TAG")]
  pub fourcc: FourCc,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

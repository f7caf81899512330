// 该文件是 DarkPlate 项目的一部分。
// src/task.rs - 逐帧处理视频文件
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

use std::{
  io::Write,
  path::{Path, PathBuf},
  time::Instant,
};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  geometry::Point,
  input::{InputError, VideoBackend, VideoSource, open_video_source},
  model::Detector,
  output::{FourCc, OutputError, SinkSettings, VideoSink, draw::format_duration, open_video_sink},
  pipeline::{FramePipeline, PipelineError},
};

/// 计时标签的缩放系数
const TIMING_LABEL_FACTOR: f32 = 0.5;

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
  #[error("处理错误: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("无法输出进度: {0}")]
  Progress(#[source] std::io::Error),
}

impl TaskError {
  /// 输入文件不是有效视频；调用方应跳过该文件而不是中止
  pub fn is_invalid_source(&self) -> bool {
    matches!(self, TaskError::Input(InputError::InvalidSource { .. }))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
  pub frames: u64,
  pub plates: u64,
}

/// `<output-dir>/<basename>_output.mp4`
pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
  let stem = input
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "video".to_string());
  output_dir.join(format!("{}_output.mp4", stem))
}

/// 进度百分比，总帧数未知时为 0
pub fn progress_percentage(frame: u64, total: u64) -> u64 {
  if total == 0 {
    0
  } else {
    (100.0 * frame as f64 / total as f64).round() as u64
  }
}

/// 每隔一秒（按四舍五入后的帧率）输出一次进度
pub fn progress_interval(fps: f64) -> u64 {
  (fps.round() as u64).max(1)
}

/// 单个视频文件的处理任务，进度写到 `progress`（通常是标准输出）
pub struct StreamTask<W> {
  progress: W,
}

impl<W: Write> StreamTask<W> {
  pub fn new(progress: W) -> Self {
    Self { progress }
  }

  pub fn into_inner(self) -> W {
    self.progress
  }

  fn report(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), TaskError> {
    self
      .progress
      .write_fmt(args)
      .and_then(|_| self.progress.flush())
      .map_err(TaskError::Progress)
  }

  /// 打开 `path` 并把结果写到 `output_dir`
  pub fn process_file<D: Detector>(
    &mut self,
    pipeline: &mut FramePipeline<D>,
    path: &Path,
    output_dir: &Path,
    backend: VideoBackend,
    fourcc: FourCc,
  ) -> Result<StreamSummary, TaskError> {
    self.report(format_args!("Processing video file \"{}\"\n", path.display()))?;
    let mut source = open_video_source(backend, path)?;
    let info = source.info();

    self.report(format_args!(
      "-> {} x {} @ {} FPS\n-> {} frames ({} seconds)\n",
      info.width,
      info.height,
      info.fps,
      info.frame_count,
      info.duration_seconds()
    ))?;

    let mut sink = open_video_sink(
      backend,
      SinkSettings {
        path: output_path(path, output_dir),
        fourcc,
        fps: info.fps,
        size: info.size(),
      },
    )?;

    self.run(
      pipeline,
      &mut source,
      &mut sink,
      &path.display().to_string(),
    )
  }

  /// 读完整个视频源；每个解码帧恰好写入 `sink` 一次
  pub fn run<D, S, K>(
    &mut self,
    pipeline: &mut FramePipeline<D>,
    source: &mut S,
    sink: &mut K,
    name: &str,
  ) -> Result<StreamSummary, TaskError>
  where
    D: Detector,
    S: VideoSource + ?Sized,
    K: VideoSink + ?Sized,
  {
    let info = source.info();
    let interval = progress_interval(info.fps);
    let mut summary = StreamSummary {
      frames: 0,
      plates: 0,
    };

    loop {
      let start = Instant::now();
      let Some(frame) = source.next_frame()? else {
        break;
      };

      let index = summary.frames;
      if index % interval == 0 {
        self.report(format_args!(
          "\r-> frame #{} ({}%)",
          index,
          progress_percentage(index, info.frame_count)
        ))?;
      }

      let outcome = pipeline.process_frame(&frame)?;
      let mut output = outcome.output;
      summary.plates += outcome.plates.len() as u64;

      let elapsed = start.elapsed();
      debug!("frame #{} 处理耗时: {:.2?}", index, elapsed);
      pipeline.annotator().draw_label(
        &format_duration(elapsed),
        &mut output,
        Point::new(0, 0),
        TIMING_LABEL_FACTOR,
      );

      sink.write_frame(&output)?;
      summary.frames += 1;
    }

    sink.finish()?;
    self.report(format_args!(
      "\r-> done processing {} frames from {}\n",
      summary.frames, name
    ))?;
    info!(
      "{}: {} 帧, 识别到 {} 个车牌",
      name, summary.frames, summary.plates
    );

    Ok(summary)
  }
}

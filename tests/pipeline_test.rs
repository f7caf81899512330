// 该文件是 DarkPlate 项目的一部分。
// tests/pipeline_test.rs - 两阶段识别流程测试
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

use std::{collections::VecDeque, convert::Infallible};

use darkplate::{
  geometry::{Rect, Size},
  input::{InputError, VideoInfo, VideoSource},
  model::{ClassNames, Detection, Detector},
  output::{OutputError, VideoSink, draw::Annotator},
  pipeline::FramePipeline,
  task::StreamTask,
};
use image::{Rgb, RgbImage};

const PLATE: usize = 0;
const BACKGROUND: Rgb<u8> = Rgb([60, 60, 60]);
const NETWORK: Size = Size {
  width: 160,
  height: 60,
};

/// 整帧返回 `frame_detections`，网络尺寸的 ROI 返回 `roi_detections`
struct ScriptedDetector {
  names: ClassNames,
  frame_detections: Vec<Detection>,
  roi_detections: Vec<Detection>,
  /// 每次调用的图像尺寸，以及图像是否仍是未修改的背景色
  calls: Vec<(u32, u32, bool)>,
}

impl ScriptedDetector {
  fn new(frame_detections: Vec<Detection>, roi_detections: Vec<Detection>) -> Self {
    Self {
      names: ["plate", "A", "B"].into_iter().collect(),
      frame_detections,
      roi_detections,
      calls: Vec::new(),
    }
  }
}

impl Detector for ScriptedDetector {
  type Error = Infallible;

  fn network_size(&self) -> Size {
    NETWORK
  }

  fn class_names(&self) -> &ClassNames {
    &self.names
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error> {
    let untouched = image.pixels().all(|p| *p == BACKGROUND);
    self.calls.push((image.width(), image.height(), untouched));

    if image.width() == NETWORK.width as u32 && image.height() == NETWORK.height as u32 {
      Ok(self.roi_detections.clone())
    } else {
      Ok(self.frame_detections.clone())
    }
  }
}

fn hd_frame() -> RgbImage {
  RgbImage::from_pixel(1920, 1080, BACKGROUND)
}

/// ROI 坐标系中乱序的两个字符，加上车牌本身
fn characters() -> Vec<Detection> {
  vec![
    Detection::new(Rect::new(90, 18, 16, 24), 2, 0.8),
    Detection::new(Rect::new(40, 15, 80, 30), PLATE, 0.9),
    Detection::new(Rect::new(50, 18, 16, 24), 1, 0.7),
  ]
}

fn pipeline(detector: ScriptedDetector) -> FramePipeline<ScriptedDetector> {
  FramePipeline::new(detector, PLATE, Annotator::new().unwrap())
}

fn changed_pixels(before: &RgbImage, after: &RgbImage) -> Vec<(u32, u32)> {
  before
    .enumerate_pixels()
    .filter(|(x, y, p)| after.get_pixel(*x, *y) != *p)
    .map(|(x, y, _)| (x, y))
    .collect()
}

#[test]
fn plate_is_recognized_and_annotated_inside_roi() {
  let plate = Detection::new(Rect::new(100, 100, 80, 30), PLATE, 0.95);
  let mut pipeline = pipeline(ScriptedDetector::new(vec![plate], characters()));
  let frame = hd_frame();

  let outcome = pipeline.process_frame(&frame).unwrap();

  assert_eq!(outcome.plates.len(), 1);
  let report = &outcome.plates[0];
  assert_eq!(report.roi, Rect::new(60, 85, 160, 60));
  assert_eq!(report.assembly.label, "AB");
  assert_eq!(report.assembly.describe(), "AB [80%]");

  let changed = changed_pixels(&frame, &outcome.output);
  assert!(!changed.is_empty());
  assert!(changed.iter().all(|&(x, y)| {
    (60..220).contains(&(x as i32)) && (85..145).contains(&(y as i32))
  }));

  // 原始帧未被修改，第二阶段看到的是干净的 ROI
  assert!(frame.pixels().all(|p| *p == BACKGROUND));
  assert_eq!(
    pipeline.detector().calls,
    vec![(1920, 1080, true), (160, 60, true)]
  );
}

#[test]
fn character_boxes_are_drawn_over_the_plate_box() {
  let plate = Detection::new(Rect::new(100, 100, 80, 30), PLATE, 0.95);
  // 字符框与车牌框共用右边和底边，且字符排在前面
  let roi_detections = vec![
    Detection::new(Rect::new(104, 30, 16, 29), 1, 0.8),
    Detection::new(Rect::new(40, 5, 80, 54), PLATE, 0.9),
  ];
  let mut pipeline = pipeline(ScriptedDetector::new(vec![plate], roi_detections));

  let outcome = pipeline.process_frame(&hd_frame()).unwrap();

  assert_eq!(outcome.plates[0].roi, Rect::new(60, 85, 160, 60));
  let character = pipeline.annotator().class_color(1);
  let plate = pipeline.annotator().class_color(PLATE);
  // ROI 内 (110, 58) 与 (119, 50) 位于共用的边上
  assert_eq!(*outcome.output.get_pixel(170, 143), character);
  assert_eq!(*outcome.output.get_pixel(179, 135), character);
  // 只属于车牌框的底边
  assert_eq!(*outcome.output.get_pixel(130, 143), plate);
}

#[test]
fn overlapping_plates_read_from_the_unmodified_frame() {
  let plates = vec![
    Detection::new(Rect::new(100, 100, 80, 30), PLATE, 0.9),
    Detection::new(Rect::new(130, 110, 80, 30), PLATE, 0.9),
  ];
  let mut pipeline = pipeline(ScriptedDetector::new(plates, characters()));

  let outcome = pipeline.process_frame(&hd_frame()).unwrap();

  assert_eq!(outcome.plates.len(), 2);
  let calls = &pipeline.detector().calls;
  assert_eq!(calls.len(), 3);
  assert!(calls.iter().all(|&(_, _, untouched)| untouched));
}

#[test]
fn rejected_or_empty_plates_leave_the_frame_untouched() {
  let cases = vec![
    // 与网络尺寸一样宽
    ScriptedDetector::new(
      vec![Detection::new(Rect::new(100, 100, 160, 30), PLATE, 0.9)],
      characters(),
    ),
    // 退化矩形
    ScriptedDetector::new(
      vec![Detection::new(Rect::new(100, 100, 0, 30), PLATE, 0.9)],
      characters(),
    ),
    // 第二阶段没有检测结果
    ScriptedDetector::new(
      vec![Detection::new(Rect::new(100, 100, 80, 30), PLATE, 0.9)],
      Vec::new(),
    ),
    // 第二阶段只有车牌本身
    ScriptedDetector::new(
      vec![Detection::new(Rect::new(100, 100, 80, 30), PLATE, 0.9)],
      vec![Detection::new(Rect::new(40, 15, 80, 30), PLATE, 0.9)],
    ),
    // 整帧只有字符类
    ScriptedDetector::new(
      vec![Detection::new(Rect::new(100, 100, 20, 30), 1, 0.9)],
      characters(),
    ),
  ];

  let frame = hd_frame();
  for detector in cases {
    let mut pipeline = pipeline(detector);
    let outcome = pipeline.process_frame(&frame).unwrap();
    assert!(outcome.plates.is_empty());
    assert_eq!(outcome.output, frame);
  }
}

#[test]
fn a_bad_plate_does_not_suppress_the_others() {
  let plates = vec![
    Detection::new(Rect::new(100, 100, 300, 30), PLATE, 0.9),
    Detection::new(Rect::new(1850, 1040, 60, 30), PLATE, 0.9),
  ];
  let mut pipeline = pipeline(ScriptedDetector::new(plates, characters()));

  let outcome = pipeline.process_frame(&hd_frame()).unwrap();

  assert_eq!(outcome.plates.len(), 1);
  // 右下角的 ROI 被平移回帧内
  assert_eq!(outcome.plates[0].roi, Rect::new(1760, 1020, 160, 60));
}

struct MemorySource {
  info: VideoInfo,
  frames: VecDeque<RgbImage>,
}

impl VideoSource for MemorySource {
  fn info(&self) -> VideoInfo {
    self.info
  }

  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    Ok(self.frames.pop_front())
  }
}

#[derive(Default)]
struct MemorySink {
  written: Vec<RgbImage>,
  finished: bool,
}

impl VideoSink for MemorySink {
  fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
    if self.finished {
      return Err(OutputError::Encoding("write after finish".to_string()));
    }
    self.written.push(frame.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    self.finished = true;
    Ok(())
  }
}

#[test]
fn zero_frame_source_finishes_immediately() {
  let mut pipeline = pipeline(ScriptedDetector::new(Vec::new(), Vec::new()));
  let mut source = MemorySource {
    info: VideoInfo {
      width: 320,
      height: 240,
      frame_count: 0,
      fps: 0.0,
    },
    frames: VecDeque::new(),
  };
  let mut sink = MemorySink::default();
  let mut task = StreamTask::new(Vec::new());

  let summary = task
    .run(&mut pipeline, &mut source, &mut sink, "empty.mp4")
    .unwrap();

  assert_eq!(summary.frames, 0);
  assert!(sink.written.is_empty());
  assert!(sink.finished);
  assert!(pipeline.detector().calls.is_empty());
  assert_eq!(
    String::from_utf8(task.into_inner()).unwrap(),
    "\r-> done processing 0 frames from empty.mp4\n"
  );
}

#[test]
fn every_frame_is_written_once_with_progress_and_timing() {
  let mut pipeline = pipeline(ScriptedDetector::new(Vec::new(), Vec::new()));
  let mut source = MemorySource {
    info: VideoInfo {
      width: 320,
      height: 240,
      frame_count: 3,
      fps: 2.0,
    },
    frames: (0..3)
      .map(|_| RgbImage::from_pixel(320, 240, BACKGROUND))
      .collect(),
  };
  let mut sink = MemorySink::default();
  let mut task = StreamTask::new(Vec::new());

  let summary = task
    .run(&mut pipeline, &mut source, &mut sink, "clip.mp4")
    .unwrap();

  assert_eq!(summary.frames, 3);
  assert_eq!(summary.plates, 0);
  assert_eq!(sink.written.len(), 3);
  assert!(sink.finished);
  assert_eq!(
    String::from_utf8(task.into_inner()).unwrap(),
    "\r-> frame #0 (0%)\r-> frame #2 (67%)\r-> done processing 3 frames from clip.mp4\n"
  );

  // 计时标签画在左上角
  for frame in &sink.written {
    assert_ne!(*frame.get_pixel(1, 1), BACKGROUND);
    assert_eq!(*frame.get_pixel(319, 239), BACKGROUND);
  }
}

// 该文件是 DarkPlate 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::{panic, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};

use darkplate::{
  config::{DetectorSettings, NetworkFiles},
  geometry::Size,
  model::{ClassNames, Detector},
  output::draw::Annotator,
  pipeline::FramePipeline,
  task::StreamTask,
};

fn main() -> ExitCode {
  let args = args::Args::parse();

  tracing_subscriber::fmt()
    .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
    .with_writer(std::io::stderr)
    .init();

  match panic::catch_unwind(|| run(&args)) {
    Ok(Ok(())) => ExitCode::SUCCESS,
    Ok(Err(e)) => {
      println!();
      println!("ERROR: {}", e);
      ExitCode::from(1)
    }
    Err(_) => {
      println!();
      println!("ERROR: unknown exception");
      ExitCode::from(2)
    }
  }
}

fn run(args: &args::Args) -> Result<()> {
  let files = NetworkFiles::discover(args.nn_dir.as_deref())?;
  let network = files.network_size()?;
  let names = files.class_names()?;
  let settings = DetectorSettings {
    threshold: args.threshold,
    nms_threshold: args.nms_threshold,
  };

  start(args, &files, names, network, settings)
}

#[cfg(feature = "onnx_detector")]
fn start(
  args: &args::Args,
  files: &NetworkFiles,
  names: ClassNames,
  network: Size,
  settings: DetectorSettings,
) -> Result<()> {
  let detector = darkplate::model::OnnxDetector::load(files, names, network, settings)?;
  process_files(args, detector)
}

#[cfg(not(feature = "onnx_detector"))]
fn start(
  _args: &args::Args,
  _files: &NetworkFiles,
  _names: ClassNames,
  _network: Size,
  _settings: DetectorSettings,
) -> Result<()> {
  anyhow::bail!("未启用检测器后端，请使用 onnx_detector 特性编译")
}

#[cfg_attr(not(feature = "onnx_detector"), allow(dead_code))]
fn process_files<D: Detector>(args: &args::Args, detector: D) -> Result<()> {
  info!(
    "网络尺寸 {}, 车牌类别 {} ({})",
    detector.network_size(),
    args.plate_class,
    detector.class_names().display(args.plate_class)
  );

  let mut pipeline = FramePipeline::new(detector, args.plate_class, Annotator::new()?);
  let mut task = StreamTask::new(std::io::stdout());

  for file in &args.files {
    match task.process_file(
      &mut pipeline,
      file,
      &args.output_dir,
      args.backend,
      args.fourcc,
    ) {
      Ok(_) => {}
      Err(e) if e.is_invalid_source() => {
        info!("{}", e);
        println!(
          "ERROR: \"{}\" is not a valid video file, or perhaps does not exist?",
          file.display()
        );
      }
      Err(e) => return Err(e.into()),
    }
  }

  Ok(())
}

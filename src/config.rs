// 该文件是 DarkPlate 项目的一部分。
// src/config.rs - 神经网络配置查找
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{geometry::Size, model::ClassNames};

pub const CONFIGURATION_FILE: &str = "DarkPlate.cfg";
pub const WEIGHTS_FILE: &str = "DarkPlate_best.onnx";
pub const NAMES_FILE: &str = "DarkPlate.names";

/// 依次查找的相对目录
pub const PROBE_DIRECTORIES: [&str; 6] = ["./", "../", "../../", "nn/", "../nn/", "../../nn/"];

/// 车牌类在 names 文件中的编号
pub const DEFAULT_PLATE_CLASS: usize = 0;
pub const DEFAULT_THRESHOLD: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to find the neural network DarkPlate.cfg")]
  NetworkNotFound,
  #[error("I/O 错误 ({}): {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无效的网络配置 {}: {reason}", .path.display())]
  InvalidCfg { path: PathBuf, reason: String },
  #[error("类别文件 {} 为空", .0.display())]
  EmptyNames(PathBuf),
}

/// 检测器阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
  pub threshold: f32,
  pub nms_threshold: f32,
}

impl Default for DetectorSettings {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
    }
  }
}

/// 同一目录下的配置、权重与类别名称文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFiles {
  pub cfg: PathBuf,
  pub weights: PathBuf,
  pub names: PathBuf,
}

impl NetworkFiles {
  pub fn in_directory(dir: &Path) -> Self {
    Self {
      cfg: dir.join(CONFIGURATION_FILE),
      weights: dir.join(WEIGHTS_FILE),
      names: dir.join(NAMES_FILE),
    }
  }

  /// 依次在 `extra`（若有）与 [`PROBE_DIRECTORIES`] 中查找配置文件
  pub fn discover(extra: Option<&Path>) -> Result<Self, ConfigError> {
    let candidates = extra
      .map(Path::to_path_buf)
      .into_iter()
      .chain(PROBE_DIRECTORIES.iter().map(PathBuf::from));
    Self::discover_in(candidates)
  }

  pub fn discover_in<I>(directories: I) -> Result<Self, ConfigError>
  where
    I: IntoIterator<Item = PathBuf>,
  {
    for dir in directories {
      let files = Self::in_directory(&dir);
      info!("Looking for {}", files.cfg.display());
      if files.cfg.is_file() {
        info!("Found neural network: {}", files.cfg.display());
        return Ok(files);
      }
    }
    Err(ConfigError::NetworkNotFound)
  }

  pub fn network_size(&self) -> Result<Size, ConfigError> {
    let content = read(&self.cfg)?;
    parse_network_size(&content).map_err(|reason| ConfigError::InvalidCfg {
      path: self.cfg.clone(),
      reason,
    })
  }

  pub fn class_names(&self) -> Result<ClassNames, ConfigError> {
    let names = ClassNames::parse(&read(&self.names)?);
    if names.is_empty() {
      return Err(ConfigError::EmptyNames(self.names.clone()));
    }
    Ok(names)
  }
}

fn read(path: &Path) -> Result<String, ConfigError> {
  std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// 读取 Darknet 配置 `[net]` 段中的 `width` 与 `height`
pub fn parse_network_size(content: &str) -> Result<Size, String> {
  let mut in_net = false;
  let mut width = None;
  let mut height = None;

  for line in content.lines() {
    let line = match line.find(['#', ';']) {
      Some(pos) => &line[..pos],
      None => line,
    }
    .trim();
    if line.is_empty() {
      continue;
    }

    if line.starts_with('[') {
      in_net = matches!(line, "[net]" | "[network]");
      continue;
    }

    if !in_net {
      continue;
    }

    let Some((key, value)) = line.split_once('=') else {
      continue;
    };
    let value = value.trim();
    match key.trim() {
      "width" => width = Some(parse_dimension("width", value)?),
      "height" => height = Some(parse_dimension("height", value)?),
      _ => {}
    }
  }

  match (width, height) {
    (Some(width), Some(height)) => Ok(Size::new(width, height)),
    _ => Err("missing width/height in [net] section".to_string()),
  }
}

fn parse_dimension(key: &str, value: &str) -> Result<i32, String> {
  match value.parse::<i32>() {
    Ok(v) if v > 0 => Ok(v),
    _ => Err(format!("invalid {} '{}'", key, value)),
  }
}

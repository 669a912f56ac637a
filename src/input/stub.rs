// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/input/stub.rs - 桩帧输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::{FromUrl, FromUrlWithScheme, frame::RgbaFrame};

use thiserror::Error;
use tracing::{error, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum StubInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
}

const STUB_SCHEME: &str = "stub";

/// 产出固定数量纯色帧的桩输入，用于测试与空跑。
///
/// 形如 `stub://?width=1280&height=720&frames=10`。
pub struct StubInput {
  width: u32,
  height: u32,
  remaining: usize,
}

impl FromUrlWithScheme for StubInput {
  const SCHEME: &'static str = STUB_SCHEME;
}

impl FromUrl for StubInput {
  type Error = StubInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != STUB_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        STUB_SCHEME,
        url.scheme()
      );
      return Err(StubInputError::SchemaMismatch);
    }

    let mut width = 1280;
    let mut height = 720;
    let mut frames = 1;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => match value.parse() {
          Ok(w) => width = w,
          Err(_) => warn!("忽略无效的 width 参数: {}", value),
        },
        "height" => match value.parse() {
          Ok(h) => height = h,
          Err(_) => warn!("忽略无效的 height 参数: {}", value),
        },
        "frames" => match value.parse() {
          Ok(n) => frames = n,
          Err(_) => warn!("忽略无效的 frames 参数: {}", value),
        },
        _ => warn!("忽略未知参数: {}", key),
      }
    }

    Ok(StubInput {
      width,
      height,
      remaining: frames,
    })
  }
}

impl Iterator for StubInput {
  type Item = RgbaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;
    Some(RgbaFrame::filled(self.width, self.height, [0, 0, 0, 255]))
  }
}

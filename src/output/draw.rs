// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::{
  frame::RgbaFrame,
  model::{DetectItem, DetectResult},
};

// 边框常量
const BOX_COLOR: [u8; 3] = [34, 197, 94]; // 绿色
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  box_color: [u8; 3],
  box_thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      box_thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  // bbox 为源帧像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.box_thickness {
      let x0 = (x_min + t).min(w - 1);
      let y0 = (y_min + t).min(h - 1);
      let x1 = (x_max - t).max(x0 + 1);
      let y1 = (y_max - t).max(y0 + 1);

      let rect = Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for DetectItem { bbox, .. } in result.items.iter() {
      self.draw_bbox(image, bbox);
    }
  }

  pub fn draw_detection(&self, frame: &RgbaFrame, result: &DetectResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

//! 视图状态
//!
//! 画布坐标与屏幕坐标之间的变换：`screen = (world + offset) * zoom`。

use crate::math::{BoundingBox2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// 视图状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// 画布宽度（像素）
    pub width: f64,
    /// 画布高度（像素）
    pub height: f64,
    /// 平移量（画布坐标）
    pub offset: Vector2,
    pub zoom: f64,
}

impl ViewState {
    pub const MIN_ZOOM: f64 = 0.1;
    pub const MAX_ZOOM: f64 = 10.0;

    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            offset: Vector2::zeros(),
            zoom: 1.0,
        }
    }

    pub fn world_to_screen(&self, world: &Point2) -> Point2 {
        Point2::from((world.coords + self.offset) * self.zoom)
    }

    pub fn screen_to_world(&self, screen: &Point2) -> Point2 {
        Point2::from(screen.coords / self.zoom - self.offset)
    }

    /// 平移（屏幕像素）
    pub fn pan(&mut self, delta: Vector2) {
        self.offset += delta / self.zoom;
    }

    /// 以屏幕上的某点为中心缩放，该点下的画布坐标保持不变
    pub fn zoom_at(&mut self, screen: &Point2, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let anchor = self.screen_to_world(screen);
        self.zoom = (self.zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        self.offset = screen.coords / self.zoom - anchor.coords;
    }

    /// 当前可见的画布范围
    pub fn visible_bounds(&self) -> BoundingBox2 {
        BoundingBox2::new(
            self.screen_to_world(&Point2::origin()),
            self.screen_to_world(&Point2::new(self.width, self.height)),
        )
    }

    /// 缩放并平移使 bounds 完整可见，四周留 margin 像素
    pub fn fit(&mut self, bounds: &BoundingBox2, margin: f64) {
        let usable_w = (self.width - 2.0 * margin).max(1.0);
        let usable_h = (self.height - 2.0 * margin).max(1.0);
        let zoom_w = if bounds.width() > 0.0 { usable_w / bounds.width() } else { self.zoom };
        let zoom_h = if bounds.height() > 0.0 { usable_h / bounds.height() } else { self.zoom };
        self.zoom = zoom_w.min(zoom_h).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);

        let screen_center = Vector2::new(self.width / 2.0, self.height / 2.0);
        self.offset = screen_center / self.zoom - bounds.center().coords;
    }

    /// 网格间距（画布坐标），保持屏幕上 20 到 200 像素之间
    pub fn grid_spacing(&self, base: f64) -> f64 {
        let mut spacing = base;
        while spacing * self.zoom < 20.0 {
            spacing *= 5.0;
        }
        while spacing * self.zoom > 200.0 {
            spacing /= 5.0;
        }
        spacing
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

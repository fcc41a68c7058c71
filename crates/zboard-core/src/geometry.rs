//! 几何图元计算
//!
//! 与实体存储无关的纯几何运算：
//! - 线段 (Line)：中点、比例点、垂足、交点
//! - 圆 (Circle)：三点定圆
//! - 多段线 (Polyline)：按弧长取点、面积、周长
//! - 角度测量

use crate::math::{cross, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};

/// 线段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point2,
    pub end: Point2,
}

impl Line {
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }

    /// 计算线段长度
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// 线段方向向量（未归一化）
    pub fn vector(&self) -> Vector2 {
        self.end - self.start
    }

    /// 计算线段中点
    pub fn midpoint(&self) -> Point2 {
        self.point_at(0.5)
    }

    /// 按比例取点，t=0 为起点，t=1 为终点
    pub fn point_at(&self, t: f64) -> Point2 {
        self.start + self.vector() * t
    }

    /// 点在线段上的投影参数（不截断）
    pub fn projection_parameter(&self, point: &Point2) -> Option<f64> {
        let v = self.vector();
        let len_sq = v.norm_squared();
        if len_sq < EPSILON {
            return None;
        }
        Some((point - self.start).dot(&v) / len_sq)
    }

    /// 计算点到线段的垂足
    ///
    /// 垂足被限制在线段上；退化线段返回起点。
    pub fn foot_of(&self, point: &Point2) -> Point2 {
        match self.projection_parameter(point) {
            Some(t) => self.point_at(t.clamp(0.0, 1.0)),
            None => self.start,
        }
    }

    /// 计算两条线段的交点
    ///
    /// 平行、共线或交点不在两条线段上时返回 None。
    pub fn intersection(&self, other: &Line) -> Option<Point2> {
        let r = self.vector();
        let s = other.vector();
        let denominator = cross(&r, &s);
        if denominator.abs() < EPSILON {
            return None;
        }

        let qp = other.start - self.start;
        let ua = cross(&qp, &s) / denominator;
        let ub = cross(&qp, &r) / denominator;

        if (0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub) {
            Some(self.point_at(ua))
        } else {
            None
        }
    }
}

/// 圆
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point2,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// 三点确定的圆（外接圆），三点共线时返回 None
    pub fn from_three_points(p1: Point2, p2: Point2, p3: Point2) -> Option<Self> {
        let d = 2.0 * (p1.x * (p2.y - p3.y) + p2.x * (p3.y - p1.y) + p3.x * (p1.y - p2.y));

        if d.abs() < EPSILON {
            return None; // 三点共线
        }

        let s1 = p1.x * p1.x + p1.y * p1.y;
        let s2 = p2.x * p2.x + p2.y * p2.y;
        let s3 = p3.x * p3.x + p3.y * p3.y;

        let ux = (s1 * (p2.y - p3.y) + s2 * (p3.y - p1.y) + s3 * (p1.y - p2.y)) / d;
        let uy = (s1 * (p3.x - p2.x) + s2 * (p1.x - p3.x) + s3 * (p2.x - p1.x)) / d;

        let center = Point2::new(ux, uy);
        Some(Self::new(center, (p1 - center).norm()))
    }
}

/// 多段线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point2>,
    /// 是否闭合
    pub closed: bool,
}

impl Polyline {
    pub fn new(points: Vec<Point2>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// 线段数量
    pub fn segment_count(&self) -> usize {
        match self.points.len() {
            0 | 1 => 0,
            n if self.closed => n,
            n => n - 1,
        }
    }

    /// 第 i 条线段
    pub fn segment(&self, index: usize) -> Line {
        let n = self.points.len();
        Line::new(self.points[index], self.points[(index + 1) % n])
    }

    /// 计算总长度
    pub fn length(&self) -> f64 {
        (0..self.segment_count())
            .map(|i| self.segment(i).length())
            .sum()
    }

    /// 按弧长比例取点，progress 被限制在 [0, 1]
    ///
    /// 空多段线返回 None；总长度为零时返回第一个点。
    pub fn point_at_progress(&self, progress: f64) -> Option<Point2> {
        let first = *self.points.first()?;
        let total = self.length();
        if total < EPSILON {
            return Some(first);
        }

        let target = progress.clamp(0.0, 1.0) * total;
        let mut walked = 0.0;
        for i in 0..self.segment_count() {
            let segment = self.segment(i);
            let length = segment.length();
            if target <= walked + length {
                if length < EPSILON {
                    return Some(segment.start);
                }
                return Some(segment.point_at((target - walked) / length));
            }
            walked += length;
        }

        // 浮点累计误差导致未命中时，停在终点
        let last = if self.closed { first } else { *self.points.last()? };
        Some(last)
    }

    /// 有向面积（鞋带公式），逆时针为正
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice_area = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            twice_area += a.x * b.y - b.x * a.y;
        }
        twice_area / 2.0
    }

    /// 面积（按闭合多边形计算）
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }
}

/// 计算以 vertex 为顶点、arm1 与 arm2 为两边的内角（度，0-180）
///
/// 任一边长度为零时返回 0。
pub fn angle_at(arm1: &Point2, vertex: &Point2, arm2: &Point2) -> f64 {
    let v1 = arm1 - vertex;
    let v2 = arm2 - vertex;
    let m1 = v1.norm();
    let m2 = v2.norm();
    if m1 < EPSILON || m2 < EPSILON {
        return 0.0;
    }
    let cos = (v1.dot(&v2) / (m1 * m2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// 将 target 绕 vertex 旋转到与 reference 成 angle_deg 的位置，保持 target 到顶点的距离
///
/// 旋转方向沿用 target 当前所在的一侧（逆时针或顺时针）。
pub fn rotate_to_angle(reference: &Point2, vertex: &Point2, target: &Point2, angle_deg: f64) -> Point2 {
    let distance = (target - vertex).norm();
    let ref_angle = (reference.y - vertex.y).atan2(reference.x - vertex.x);
    let current = (target.y - vertex.y).atan2(target.x - vertex.x);

    let diff = (current - ref_angle).rem_euclid(std::f64::consts::TAU);
    let target_rad = angle_deg.to_radians();
    let new_angle = if diff <= std::f64::consts::PI {
        ref_angle + target_rad
    } else {
        ref_angle - target_rad
    };

    Point2::new(
        vertex.x + distance * new_angle.cos(),
        vertex.y + distance * new_angle.sin(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_midpoint_and_ratio() {
        let line = Line::new(Point2::new(0.0, 0.0), Point2::new(10.0, 4.0));
        assert_eq!(line.midpoint(), Point2::new(5.0, 2.0));
        assert_eq!(line.point_at(0.25), Point2::new(2.5, 1.0));
    }

    #[test]
    fn test_foot_is_clamped() {
        let line = Line::new(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0));
        assert_eq!(line.foot_of(&Point2::new(3.0, 7.0)), Point2::new(3.0, 0.0));
        assert_eq!(line.foot_of(&Point2::new(-5.0, 2.0)), Point2::new(0.0, 0.0));
        assert_eq!(line.foot_of(&Point2::new(25.0, -2.0)), Point2::new(10.0, 0.0));

        let degenerate = Line::new(Point2::new(1.0, 1.0), Point2::new(1.0, 1.0));
        assert_eq!(degenerate.foot_of(&Point2::new(5.0, 5.0)), Point2::new(1.0, 1.0));
    }

    #[test]
    fn test_intersection() {
        let a = Line::new(Point2::new(0.0, 0.0), Point2::new(10.0, 10.0));
        let b = Line::new(Point2::new(0.0, 10.0), Point2::new(10.0, 0.0));
        let p = a.intersection(&b).unwrap();
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 5.0, epsilon = 1e-9);

        let parallel = Line::new(Point2::new(0.0, 1.0), Point2::new(10.0, 11.0));
        assert!(a.intersection(&parallel).is_none());

        let short = Line::new(Point2::new(0.0, 10.0), Point2::new(2.0, 8.0));
        assert!(a.intersection(&short).is_none());
    }

    #[test]
    fn test_circumcircle() {
        let c = Circle::from_three_points(
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(0.0, 4.0),
        )
        .unwrap();
        assert_relative_eq!(c.center.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(c.center.y, 2.0, epsilon = 1e-9);
        assert_relative_eq!(c.radius, 8.0_f64.sqrt(), epsilon = 1e-9);

        assert!(Circle::from_three_points(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
        )
        .is_none());
    }

    #[test]
    fn test_polyline_progress() {
        let path = Polyline::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 30.0),
            ],
            false,
        );
        assert_eq!(path.length(), 40.0);
        assert_eq!(path.point_at_progress(0.0), Some(Point2::new(0.0, 0.0)));
        assert_eq!(path.point_at_progress(0.25), Some(Point2::new(10.0, 0.0)));
        assert_eq!(path.point_at_progress(0.5), Some(Point2::new(10.0, 10.0)));
        assert_eq!(path.point_at_progress(1.0), Some(Point2::new(10.0, 30.0)));
        assert_eq!(Polyline::new(vec![], false).point_at_progress(0.5), None);
    }

    #[test]
    fn test_area_shoelace() {
        let square = Polyline::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(4.0, 4.0),
                Point2::new(0.0, 4.0),
            ],
            true,
        );
        assert_eq!(square.area(), 16.0);
        assert_eq!(square.length(), 16.0);
        assert!(square.signed_area() > 0.0);
    }

    #[test]
    fn test_angle_at() {
        let vertex = Point2::new(0.0, 0.0);
        assert_relative_eq!(
            angle_at(&Point2::new(1.0, 0.0), &vertex, &Point2::new(0.0, 2.0)),
            90.0,
            epsilon = 1e-9
        );
        assert_eq!(angle_at(&vertex, &vertex, &Point2::new(1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_rotate_to_angle_keeps_side() {
        let vertex = Point2::new(0.0, 0.0);
        let reference = Point2::new(1.0, 0.0);

        // 逆时针一侧
        let p = rotate_to_angle(&reference, &vertex, &Point2::new(0.0, 5.0), 60.0);
        assert_relative_eq!(angle_at(&reference, &vertex, &p), 60.0, epsilon = 1e-9);
        assert!(p.y > 0.0);
        assert_relative_eq!((p - vertex).norm(), 5.0, epsilon = 1e-9);

        // 顺时针一侧
        let q = rotate_to_angle(&reference, &vertex, &Point2::new(0.0, -5.0), 60.0);
        assert!(q.y < 0.0);
        assert_relative_eq!(angle_at(&reference, &vertex, &q), 60.0, epsilon = 1e-9);
    }
}

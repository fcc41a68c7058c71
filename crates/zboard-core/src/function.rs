//! 函数图像 y = f(x)

use crate::error::{BoardError, BoardResult};
use crate::expr::{parse_expression, Expr, ExprError};
use crate::math::Point2;
use crate::properties::Color;
use serde::{Deserialize, Serialize};

/// 函数图像
///
/// 序列化时只保存表达式文本，反序列化时重新解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FunctionPlotData", into = "FunctionPlotData")]
pub struct FunctionPlot {
    pub name: String,
    expression: String,
    pub color: Color,
    x_min: f64,
    x_max: f64,
    pub visible: bool,
    pub line_width: f64,
    compiled: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionPlotData {
    name: String,
    expression: String,
    color: Color,
    x_min: f64,
    x_max: f64,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default = "default_line_width")]
    line_width: f64,
}

fn default_visible() -> bool {
    true
}

fn default_line_width() -> f64 {
    2.0
}

impl TryFrom<FunctionPlotData> for FunctionPlot {
    type Error = BoardError;

    fn try_from(data: FunctionPlotData) -> Result<Self, Self::Error> {
        let mut plot = FunctionPlot::new(&data.expression, data.x_min, data.x_max)?;
        plot.name = data.name;
        plot.color = data.color;
        plot.visible = data.visible;
        plot.line_width = data.line_width;
        Ok(plot)
    }
}

impl From<FunctionPlot> for FunctionPlotData {
    fn from(plot: FunctionPlot) -> Self {
        Self {
            name: plot.name,
            expression: plot.expression,
            color: plot.color,
            x_min: plot.x_min,
            x_max: plot.x_max,
            visible: plot.visible,
            line_width: plot.line_width,
        }
    }
}

impl FunctionPlot {
    /// 默认颜色
    pub const DEFAULT_COLOR: Color = Color::rgb(0, 100, 200);

    pub fn new(expression: &str, x_min: f64, x_max: f64) -> BoardResult<Self> {
        if !(x_min.is_finite() && x_max.is_finite() && x_min < x_max) {
            return Err(BoardError::InvalidParameter(format!(
                "invalid x range [{x_min}, {x_max}]"
            )));
        }
        let compiled = parse_expression(expression)?;
        Ok(Self {
            name: format!("f(x) = {}", expression.trim()),
            expression: expression.trim().to_string(),
            color: Self::DEFAULT_COLOR,
            x_min,
            x_max,
            visible: true,
            line_width: default_line_width(),
            compiled,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn range(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.compiled.eval(x)
    }

    /// 在 [x_min, x_max] 上均匀采样 resolution + 1 个点
    ///
    /// 遇到非有限值时断开，返回连续的折线段。
    pub fn sample(&self, resolution: usize) -> BoardResult<Vec<Vec<Point2>>> {
        if resolution == 0 || resolution > MAX_SAMPLES {
            return Err(BoardError::InvalidParameter(format!(
                "resolution must be in 1..={MAX_SAMPLES}, got {resolution}"
            )));
        }
        let mut runs: Vec<Vec<Point2>> = Vec::new();
        let mut current: Vec<Point2> = Vec::new();

        for x in grid(self.x_min, self.x_max, resolution) {
            let y = self.evaluate(x);
            if y.is_finite() {
                current.push(Point2::new(x, y));
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        Ok(runs)
    }

    // === 分析 ===

    /// 与另一函数在 [x_start, x_end] 上的交点
    ///
    /// 按 `precision` 步长扫描差值的符号变化，再二分定位。跨越间断点的
    /// 符号变化不算交点；相距小于 `10 * precision` 的交点只保留一个。
    pub fn intersections(
        &self,
        other: &FunctionPlot,
        x_start: f64,
        x_end: f64,
        precision: f64,
    ) -> BoardResult<Vec<Point2>> {
        let xs = grid(x_start, x_end, steps_for(x_start, x_end, precision)?);
        let diff = |x: f64| self.evaluate(x) - other.evaluate(x);

        let mut found: Vec<Point2> = Vec::new();
        let mut push = |x: f64| {
            let y = self.evaluate(x);
            if y.is_finite() && found.iter().all(|p| (p.x - x).abs() >= precision * 10.0) {
                found.push(Point2::new(x, y));
            }
        };

        let mut previous: Option<(f64, f64)> = None;
        for x in xs {
            let d = diff(x);
            if !d.is_finite() {
                previous = None;
                continue;
            }
            if d == 0.0 {
                push(x);
            } else if let Some((px, pd)) = previous {
                if pd * d < 0.0 {
                    if let Some(root) = bisect(&diff, px, x) {
                        push(root);
                    }
                }
            }
            previous = Some((x, d));
        }
        Ok(found)
    }

    /// [x_start, x_end] 上以 `step` 扫描得到的局部极大、极小值点
    pub fn extrema(&self, x_start: f64, x_end: f64, step: f64) -> BoardResult<Extrema> {
        let samples: Vec<(f64, Option<f64>)> = grid(x_start, x_end, steps_for(x_start, x_end, step)?)
            .map(|x| {
                let y = self.evaluate(x);
                (x, y.is_finite().then_some(y))
            })
            .collect();

        let mut extrema = Extrema::default();
        for window in samples.windows(3) {
            let [(_, Some(prev)), (x, Some(y)), (_, Some(next))] = window else {
                continue;
            };
            if y > prev && y > next {
                extrema.maxima.push(Point2::new(*x, *y));
            } else if y < prev && y < next {
                extrema.minima.push(Point2::new(*x, *y));
            }
        }
        Ok(extrema)
    }

    /// [x_start, x_end] 上的值域，函数处处无定义时返回 None
    pub fn value_range(&self, x_start: f64, x_end: f64) -> BoardResult<Option<ValueRange>> {
        check_interval(x_start, x_end)?;
        let range = grid(x_start, x_end, RANGE_SAMPLES)
            .map(|x| self.evaluate(x))
            .filter(|y| y.is_finite())
            .fold(None, |acc: Option<ValueRange>, y| {
                Some(match acc {
                    Some(r) => ValueRange {
                        min: r.min.min(y),
                        max: r.max.max(y),
                    },
                    None => ValueRange { min: y, max: y },
                })
            });
        Ok(range)
    }
}

/// 采样点数上限
pub const MAX_SAMPLES: usize = 1_000_000;

/// 值域查询的采样分段数
const RANGE_SAMPLES: usize = 1000;

/// 局部极值点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub maxima: Vec<Point2>,
    pub minima: Vec<Point2>,
}

/// 值域
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

fn check_interval(x_start: f64, x_end: f64) -> BoardResult<()> {
    if x_start.is_finite() && x_end.is_finite() && x_start < x_end {
        Ok(())
    } else {
        Err(BoardError::InvalidParameter(format!(
            "invalid x range [{x_start}, {x_end}]"
        )))
    }
}

/// 按步长换算分段数，超过 [`MAX_SAMPLES`] 时拒绝
fn steps_for(x_start: f64, x_end: f64, step: f64) -> BoardResult<usize> {
    check_interval(x_start, x_end)?;
    if !(step.is_finite() && step > 0.0) {
        return Err(BoardError::InvalidParameter(format!("invalid step {step}")));
    }
    let steps = ((x_end - x_start) / step).ceil();
    if steps > MAX_SAMPLES as f64 {
        return Err(BoardError::InvalidParameter(format!(
            "step {step} over [{x_start}, {x_end}] needs more than {MAX_SAMPLES} samples"
        )));
    }
    Ok((steps as usize).max(1))
}

/// 区间的 steps + 1 个等分点，末点精确等于 x_end
fn grid(x_start: f64, x_end: f64, steps: usize) -> impl Iterator<Item = f64> {
    let dx = (x_end - x_start) / steps as f64;
    (0..=steps).map(move |i| if i == steps { x_end } else { x_start + i as f64 * dx })
}

/// 二分求 f 在 [lo, hi] 内的零点，f(lo) 与 f(hi) 异号
///
/// 收敛后残差仍然很大（间断点两侧）时返回 None。
fn bisect(f: &impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> Option<f64> {
    let mut f_lo = f(lo);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if !f_mid.is_finite() {
            return None;
        }
        if f_mid == 0.0 || mid == lo || mid == hi {
            break;
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    let root = 0.5 * (lo + hi);
    (f(root).abs() <= 1e-6).then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_continuous() {
        let plot = FunctionPlot::new("x^2", -1.0, 1.0).unwrap();
        let runs = plot.sample(4).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 5);
        assert_relative_eq!(runs[0][1].y, 0.25);
    }

    #[test]
    fn test_sample_splits_at_discontinuity() {
        let plot = FunctionPlot::new("sqrt(1 - x^2) / x", -2.0, 2.0).unwrap();
        let runs = plot.sample(8).unwrap();
        // x = -2, -1.5 无定义；x = 0 除零；x = 1.5, 2 无定义
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().flatten().all(|p| p.y.is_finite()));
    }

    #[test]
    fn test_sample_resolution_bounds() {
        let plot = FunctionPlot::new("x", 0.0, 1.0).unwrap();
        assert!(matches!(plot.sample(0), Err(BoardError::InvalidParameter(_))));
        assert!(matches!(
            plot.sample(MAX_SAMPLES + 1),
            Err(BoardError::InvalidParameter(_))
        ));
        let runs = plot.sample(3).unwrap();
        assert_eq!(runs[0].last().unwrap().x, 1.0);
    }

    #[test]
    fn test_intersections() {
        let parabola = FunctionPlot::new("x^2", -10.0, 10.0).unwrap();
        let line = FunctionPlot::new("x + 2", -10.0, 10.0).unwrap();
        let points = parabola.intersections(&line, -10.0, 10.0, 0.001).unwrap();
        assert_eq!(points.len(), 2);
        assert_relative_eq!(points[0].x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(points[0].y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(points[1].x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(points[1].y, 4.0, epsilon = 1e-6);

        // 1/x 在 0 两侧变号但没有交点
        let hyperbola = FunctionPlot::new("1/x", -1.0, 1.0).unwrap();
        let zero = FunctionPlot::new("0", -1.0, 1.0).unwrap();
        assert!(hyperbola.intersections(&zero, -1.0, 1.0, 0.001).unwrap().is_empty());

        assert!(matches!(
            parabola.intersections(&line, -1e9, 1e9, 0.001),
            Err(BoardError::InvalidParameter(_))
        ));
        assert!(parabola.intersections(&line, 0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_extrema() {
        let cubic = FunctionPlot::new("x^3 - 3*x", -3.0, 3.0).unwrap();
        let extrema = cubic.extrema(-3.0, 3.0, 0.01).unwrap();
        assert_eq!(extrema.maxima.len(), 1);
        assert_eq!(extrema.minima.len(), 1);
        assert_relative_eq!(extrema.maxima[0].x, -1.0, epsilon = 0.01);
        assert_relative_eq!(extrema.maxima[0].y, 2.0, epsilon = 1e-3);
        assert_relative_eq!(extrema.minima[0].x, 1.0, epsilon = 0.01);
        assert_relative_eq!(extrema.minima[0].y, -2.0, epsilon = 1e-3);

        let line = FunctionPlot::new("2*x", -1.0, 1.0).unwrap();
        assert_eq!(line.extrema(-1.0, 1.0, 0.1).unwrap(), Extrema::default());
    }

    #[test]
    fn test_value_range() {
        let parabola = FunctionPlot::new("x^2", -2.0, 3.0).unwrap();
        let range = parabola.value_range(-2.0, 3.0).unwrap().unwrap();
        assert_relative_eq!(range.min, 0.0, epsilon = 1e-9);
        assert_relative_eq!(range.max, 9.0);

        let root = FunctionPlot::new("sqrt(x)", -2.0, -1.0).unwrap();
        assert_eq!(root.value_range(-2.0, -1.0).unwrap(), None);
        assert!(parabola.value_range(3.0, -2.0).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(FunctionPlot::new("x +", 0.0, 1.0).is_err());
        assert!(FunctionPlot::new("x", 1.0, 1.0).is_err());
    }

    #[test]
    fn test_serde_reparses_expression() {
        let plot = FunctionPlot::new("sin(x)", 0.0, 3.0).unwrap();
        let json = serde_json::to_string(&plot).unwrap();
        assert!(!json.contains("compiled"));
        let restored: FunctionPlot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, plot);
        assert_relative_eq!(restored.evaluate(0.0), 0.0);

        let broken = json.replace("sin(x)", "sin(");
        assert!(serde_json::from_str::<FunctionPlot>(&broken).is_err());
    }
}

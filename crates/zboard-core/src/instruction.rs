//! 绘图指令
//!
//! 指令是带 `"type"` 标签的 JSON 对象，数值字段同时接受数字和数字字符串。
//! 复合图形（正三角形、矩形、正多边形、手拉手模型等）通过 [`Instruction::expand`]
//! 展开为点和线段指令。
//!
//! 两种解析入口：
//! - [`parse_instructions`]：严格模式，任一条目不合法即整体失败
//! - [`parse_assistant_reply`]：宽松模式，从助手回复中尽量提取指令，跳过无法识别的条目

use crate::error::{BoardError, BoardResult};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::{PI, TAU};

/// 数值字段的宽松反序列化
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
    }

    fn to_f64<E: Error>(number: Number) -> Result<f64, E> {
        match number {
            Number::Float(v) => Ok(v),
            Number::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got '{s}'"))),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        to_f64(Number::deserialize(deserializer)?)
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Option::<Number>::deserialize(deserializer)?
            .map(to_f64)
            .transpose()
    }
}

/// 绘图指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    Point {
        #[serde(default)]
        name: Option<String>,
        #[serde(deserialize_with = "lenient::f64")]
        x: f64,
        #[serde(deserialize_with = "lenient::f64")]
        y: f64,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        fixed: bool,
    },
    Line {
        #[serde(default)]
        name: Option<String>,
        start_point: String,
        end_point: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        width: Option<f64>,
    },
    /// 用三条边连接三个已有的点
    Triangle {
        #[serde(default)]
        name: Option<String>,
        points: Vec<String>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        fill_color: Option<String>,
    },
    /// 手动多边形：连接各顶点并登记为多边形
    Polygon {
        #[serde(default)]
        name: Option<String>,
        points: Vec<String>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        fill_color: Option<String>,
    },
    Midpoint {
        #[serde(default)]
        point_name: Option<String>,
        line_name: String,
        #[serde(default)]
        color: Option<String>,
    },
    RatioPoint {
        #[serde(default)]
        point_name: Option<String>,
        line_name: String,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        ratio: Option<f64>,
        #[serde(default)]
        color: Option<String>,
    },
    PerpendicularFoot {
        #[serde(default)]
        foot_name: Option<String>,
        source_point_name: String,
        line_name: String,
        #[serde(default)]
        color: Option<String>,
    },
    Circumcenter {
        #[serde(default)]
        point_name: Option<String>,
        points: Vec<String>,
        #[serde(default)]
        color: Option<String>,
    },
    Intersection {
        #[serde(default)]
        point_name: Option<String>,
        line1: String,
        line2: String,
        #[serde(default)]
        color: Option<String>,
    },
    EquilateralTriangle {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_y: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        side_length: Option<f64>,
    },
    IsoscelesTriangle {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        apex_x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        apex_y: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        base_width: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        height: Option<f64>,
    },
    RightTriangle {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        right_angle_x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        right_angle_y: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        leg1_length: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        leg2_length: Option<f64>,
    },
    Rectangle {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        y: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        width: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        height: Option<f64>,
    },
    RegularPolygon {
        #[serde(default)]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_y: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        radius: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        sides: Option<f64>,
    },
    FixedLengthLine {
        #[serde(default)]
        name: Option<String>,
        start_point: String,
        end_point: String,
        #[serde(deserialize_with = "lenient::f64")]
        length: f64,
        #[serde(default)]
        color: Option<String>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        width: Option<f64>,
    },
    FixedAngle {
        #[serde(default)]
        name: Option<String>,
        vertex: String,
        point1: String,
        point2: String,
        #[serde(deserialize_with = "lenient::f64")]
        angle: f64,
    },
    FixedPoint {
        point: String,
    },
    /// 手拉手模型：共顶点 O 的两个等腰三角形 OAB、OCD，以 AC、BD 相连
    HandInHand {
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_x: Option<f64>,
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        center_y: Option<f64>,
        /// OA = OB
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        r1: Option<f64>,
        /// OC = OD
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        r2: Option<f64>,
        /// ∠AOB（度）
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        alpha: Option<f64>,
        /// ∠COD（度）
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        beta: Option<f64>,
        /// OCD 的对称轴相对 OAB 的旋转角（度）
        #[serde(default, deserialize_with = "lenient::opt_f64")]
        theta: Option<f64>,
    },
}

fn point(name: String, x: f64, y: f64, color: &str) -> Instruction {
    Instruction::Point {
        name: Some(name),
        x,
        y,
        color: Some(color.to_string()),
        fixed: false,
    }
}

fn line(name: String, start: &str, end: &str, color: &str) -> Instruction {
    Instruction::Line {
        name: Some(name),
        start_point: start.to_string(),
        end_point: end.to_string(),
        color: Some(color.to_string()),
        width: None,
    }
}

fn positive(value: f64, what: &str) -> BoardResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(BoardError::InvalidParameter(format!("{what} must be positive, got {value}")))
    }
}

fn finite(value: f64, what: &str) -> BoardResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BoardError::InvalidParameter(format!("{what} must be finite")))
    }
}

/// 依次连接顶点的闭合边
fn closed_outline(vertices: Vec<(String, f64, f64)>, edge_name: impl Fn(usize, &str, &str) -> String) -> Vec<Instruction> {
    let mut out: Vec<Instruction> = vertices
        .iter()
        .map(|(name, x, y)| point(name.clone(), *x, *y, "#000000"))
        .collect();
    let n = vertices.len();
    for i in 0..n {
        let a = &vertices[i].0;
        let b = &vertices[(i + 1) % n].0;
        out.push(line(edge_name(i, a, b), a, b, "#000000"));
    }
    out
}

impl Instruction {
    /// 指令类型名
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Point { .. } => "point",
            Instruction::Line { .. } => "line",
            Instruction::Triangle { .. } => "triangle",
            Instruction::Polygon { .. } => "polygon",
            Instruction::Midpoint { .. } => "midpoint",
            Instruction::RatioPoint { .. } => "ratio_point",
            Instruction::PerpendicularFoot { .. } => "perpendicular_foot",
            Instruction::Circumcenter { .. } => "circumcenter",
            Instruction::Intersection { .. } => "intersection",
            Instruction::EquilateralTriangle { .. } => "equilateral_triangle",
            Instruction::IsoscelesTriangle { .. } => "isosceles_triangle",
            Instruction::RightTriangle { .. } => "right_triangle",
            Instruction::Rectangle { .. } => "rectangle",
            Instruction::RegularPolygon { .. } => "regular_polygon",
            Instruction::FixedLengthLine { .. } => "fixed_length_line",
            Instruction::FixedAngle { .. } => "fixed_angle",
            Instruction::FixedPoint { .. } => "fixed_point",
            Instruction::HandInHand { .. } => "hand_in_hand",
        }
    }

    /// 是否为需要展开的复合图形
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Instruction::EquilateralTriangle { .. }
                | Instruction::IsoscelesTriangle { .. }
                | Instruction::RightTriangle { .. }
                | Instruction::Rectangle { .. }
                | Instruction::RegularPolygon { .. }
                | Instruction::HandInHand { .. }
        )
    }

    /// 展开为基本指令；基本指令原样返回
    pub fn expand(&self) -> BoardResult<Vec<Instruction>> {
        let expanded = match self {
            Instruction::EquilateralTriangle {
                name,
                center_x,
                center_y,
                side_length,
            } => {
                let prefix = name.as_deref().unwrap_or("T");
                let cx = finite(center_x.unwrap_or(300.0), "center_x")?;
                let cy = finite(center_y.unwrap_or(200.0), "center_y")?;
                let side = positive(side_length.unwrap_or(100.0), "side_length")?;
                let r = side / 3f64.sqrt();
                closed_outline(
                    vec![
                        (format!("{prefix}A"), cx, cy - r),
                        (format!("{prefix}B"), cx - side / 2.0, cy + r / 2.0),
                        (format!("{prefix}C"), cx + side / 2.0, cy + r / 2.0),
                    ],
                    |_, a, b| format!("{a}{}", &b[prefix.len()..]),
                )
            }
            Instruction::IsoscelesTriangle {
                name,
                apex_x,
                apex_y,
                base_width,
                height,
            } => {
                let prefix = name.as_deref().unwrap_or("T");
                let ax = finite(apex_x.unwrap_or(300.0), "apex_x")?;
                let ay = finite(apex_y.unwrap_or(100.0), "apex_y")?;
                let w = positive(base_width.unwrap_or(200.0), "base_width")?;
                let h = positive(height.unwrap_or(150.0), "height")?;
                closed_outline(
                    vec![
                        (format!("{prefix}A"), ax, ay),
                        (format!("{prefix}B"), ax - w / 2.0, ay + h),
                        (format!("{prefix}C"), ax + w / 2.0, ay + h),
                    ],
                    |_, a, b| format!("{a}{}", &b[prefix.len()..]),
                )
            }
            Instruction::RightTriangle {
                name,
                right_angle_x,
                right_angle_y,
                leg1_length,
                leg2_length,
            } => {
                let prefix = name.as_deref().unwrap_or("T");
                let x = finite(right_angle_x.unwrap_or(200.0), "right_angle_x")?;
                let y = finite(right_angle_y.unwrap_or(200.0), "right_angle_y")?;
                let leg1 = positive(leg1_length.unwrap_or(100.0), "leg1_length")?;
                let leg2 = positive(leg2_length.unwrap_or(150.0), "leg2_length")?;
                closed_outline(
                    vec![
                        (format!("{prefix}A"), x, y),
                        (format!("{prefix}B"), x + leg1, y),
                        (format!("{prefix}C"), x, y + leg2),
                    ],
                    |_, a, b| format!("{a}{}", &b[prefix.len()..]),
                )
            }
            Instruction::Rectangle {
                name,
                x,
                y,
                width,
                height,
            } => {
                let prefix = name.as_deref().unwrap_or("R");
                let x = finite(x.unwrap_or(200.0), "x")?;
                let y = finite(y.unwrap_or(150.0), "y")?;
                let w = positive(width.unwrap_or(200.0), "width")?;
                let h = positive(height.unwrap_or(100.0), "height")?;
                closed_outline(
                    vec![
                        (format!("{prefix}A"), x, y),
                        (format!("{prefix}B"), x + w, y),
                        (format!("{prefix}C"), x + w, y + h),
                        (format!("{prefix}D"), x, y + h),
                    ],
                    |_, a, b| format!("{a}{}", &b[prefix.len()..]),
                )
            }
            Instruction::RegularPolygon {
                name,
                center_x,
                center_y,
                radius,
                sides,
            } => {
                let prefix = name.as_deref().unwrap_or("P");
                let cx = finite(center_x.unwrap_or(300.0), "center_x")?;
                let cy = finite(center_y.unwrap_or(200.0), "center_y")?;
                let r = positive(radius.unwrap_or(80.0), "radius")?;
                let sides = sides.unwrap_or(6.0);
                if !(sides.fract() == 0.0 && (3.0..=64.0).contains(&sides)) {
                    return Err(BoardError::InvalidParameter(format!(
                        "sides must be an integer in 3..=64, got {sides}"
                    )));
                }
                let n = sides as usize;
                let vertices = (0..n)
                    .map(|i| {
                        let angle = TAU * i as f64 / n as f64 - PI / 2.0;
                        (format!("{prefix}{}", i + 1), cx + r * angle.cos(), cy + r * angle.sin())
                    })
                    .collect();
                closed_outline(vertices, |i, _, _| format!("{prefix}_边{}", i + 1))
            }
            Instruction::HandInHand {
                center_x,
                center_y,
                r1,
                r2,
                alpha,
                beta,
                theta,
            } => hand_in_hand(
                finite(center_x.unwrap_or(400.0), "center_x")?,
                finite(center_y.unwrap_or(300.0), "center_y")?,
                positive(r1.unwrap_or(160.0), "r1")?,
                positive(r2.unwrap_or(240.0), "r2")?,
                alpha.unwrap_or(70.0),
                beta.unwrap_or(80.0),
                finite(theta.unwrap_or(180.0), "theta")?,
            )?,
            other => vec![other.clone()],
        };
        Ok(expanded)
    }
}

/// 手拉手模型
///
/// 屏幕坐标 y 轴向下。OAB 的对称轴指向上方，OCD 的对称轴再转 theta 度；
/// A、B 位于轴两侧 alpha/2 处，C、D 位于轴两侧 beta/2 处，AC 与 BD 为连线。
fn hand_in_hand(
    cx: f64,
    cy: f64,
    r1: f64,
    r2: f64,
    alpha: f64,
    beta: f64,
    theta: f64,
) -> BoardResult<Vec<Instruction>> {
    for (value, what) in [(alpha, "alpha"), (beta, "beta")] {
        if !(value.is_finite() && value > 0.0 && value < 180.0) {
            return Err(BoardError::InvalidParameter(format!(
                "{what} must be in (0, 180), got {value}"
            )));
        }
    }

    let at = |radius: f64, degrees: f64| {
        let rad = degrees.to_radians();
        (cx + radius * rad.cos(), cy + radius * rad.sin())
    };
    let axis1 = -90.0;
    let axis2 = axis1 + theta;
    let (ax, ay) = at(r1, axis1 - alpha / 2.0);
    let (bx, by) = at(r1, axis1 + alpha / 2.0);
    let (cx2, cy2) = at(r2, axis2 + beta / 2.0);
    let (dx, dy) = at(r2, axis2 - beta / 2.0);

    let fixed_leg = |name: &str, end: &str, length: f64| Instruction::FixedLengthLine {
        name: Some(name.to_string()),
        start_point: "O".to_string(),
        end_point: end.to_string(),
        length,
        color: Some("#000000".to_string()),
        width: None,
    };
    let fixed_angle = |name: &str, p1: &str, p2: &str, angle: f64| Instruction::FixedAngle {
        name: Some(name.to_string()),
        vertex: "O".to_string(),
        point1: p1.to_string(),
        point2: p2.to_string(),
        angle,
    };

    Ok(vec![
        point("O".into(), cx, cy, "#FF0000"),
        point("A".into(), ax, ay, "#0000FF"),
        point("B".into(), bx, by, "#0000FF"),
        point("C".into(), cx2, cy2, "#00FF00"),
        point("D".into(), dx, dy, "#00FF00"),
        fixed_leg("OA", "A", r1),
        fixed_leg("OB", "B", r1),
        fixed_leg("OC", "C", r2),
        fixed_leg("OD", "D", r2),
        line("AB".into(), "A", "B", "#000000"),
        line("CD".into(), "C", "D", "#000000"),
        line("AC".into(), "A", "C", "#FF0000"),
        line("BD".into(), "B", "D", "#FF0000"),
        fixed_angle("AOB", "A", "B", alpha),
        fixed_angle("COD", "C", "D", beta),
        Instruction::FixedPoint { point: "O".into() },
        Instruction::FixedPoint { point: "A".into() },
    ])
}

/// 严格解析：JSON 数组或单个对象
///
/// 任一条目不合法时返回错误并指出条目序号。
pub fn parse_instructions(json: &str) -> BoardResult<Vec<Instruction>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BoardError::MalformedInstructions(format!("invalid JSON: {e}")))?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item).map_err(|e| {
                    BoardError::MalformedInstructions(format!("item {index}: {e}"))
                })
            })
            .collect(),
        object @ serde_json::Value::Object(_) => serde_json::from_value(object)
            .map(|instruction| vec![instruction])
            .map_err(|e| BoardError::MalformedInstructions(e.to_string())),
        _ => Err(BoardError::MalformedInstructions(
            "expected a JSON array or object".into(),
        )),
    }
}

/// 宽松解析 JSON 值中的指令，跳过无法识别的条目
fn collect_lenient(value: serde_json::Value, out: &mut Vec<Instruction>) {
    let items = match value {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => return,
    };
    for item in items {
        let kind = item
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value::<Instruction>(item) {
            Ok(instruction) => out.push(instruction),
            Err(e) => tracing::warn!("Skipping instruction of type '{}': {}", kind, e),
        }
    }
}

/// 从助手回复中提取指令
///
/// 依次尝试：```json 代码块、整段 JSON（或首个 `[`/`{` 开始的片段）、自然语言描述。
pub fn parse_assistant_reply(text: &str) -> Vec<Instruction> {
    let mut instructions = Vec::new();

    let fenced = Regex::new(r"(?s)```(?:json|JSON)\s*(.*?)\s*```").ok();
    let mut saw_block = false;
    if let Some(fenced) = fenced {
        for captures in fenced.captures_iter(text) {
            saw_block = true;
            let Some(body) = captures.get(1) else {
                continue;
            };
            match serde_json::from_str(body.as_str()) {
                Ok(value) => collect_lenient(value, &mut instructions),
                Err(e) => tracing::warn!("Skipping malformed JSON block: {}", e),
            }
        }
    }

    if !saw_block {
        if let Some(value) = bare_json(text) {
            collect_lenient(value, &mut instructions);
        }
    }

    if instructions.is_empty() {
        instructions = parse_natural_language(text);
    }

    tracing::debug!("Extracted {} instructions from assistant reply", instructions.len());
    instructions
}

fn bare_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let start = trimmed.find(['[', '{'])?;
    let end = trimmed.rfind([']', '}'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

const NUMBER: &str = r"(-?\d+(?:\.\d+)?)";

/// 自然语言中的点、线段、三角形描述（中英文）
pub fn parse_natural_language(text: &str) -> Vec<Instruction> {
    let mut out = Vec::new();

    let point_patterns = [
        format!(r"点\s*([A-Za-z]\w*)\s*[：:]?\s*(?:坐标\s*)?[（(]\s*{NUMBER}\s*[,，]\s*{NUMBER}\s*[)）]"),
        format!(r"(?i)point\s+([A-Za-z]\w*)\s*(?:at\s*)?[:=]?\s*\(\s*{NUMBER}\s*,\s*{NUMBER}\s*\)"),
    ];
    let mut point_names = HashSet::new();
    for pattern in &point_patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for c in re.captures_iter(text) {
            let name = c[1].to_string();
            let (Ok(x), Ok(y)) = (c[2].parse::<f64>(), c[3].parse::<f64>()) else {
                continue;
            };
            if point_names.insert(name.clone()) {
                out.push(Instruction::Point {
                    name: Some(name),
                    x,
                    y,
                    color: None,
                    fixed: false,
                });
            }
        }
    }

    let line_patterns = [
        r"(?:线段|直线)\s*(?:[A-Za-z]\w*\s*[：:]\s*)?(?:从\s*)?([A-Za-z]\w*)\s*(?:到|至|-)\s*([A-Za-z]\w*)",
        r"从\s*([A-Za-z]\w*)\s*(?:到|至)\s*([A-Za-z]\w*)\s*(?:画|绘制|创建|连)",
        r"(?i)(?:line|segment)\s+(?:from\s+)?([A-Za-z]\w*)\s+to\s+([A-Za-z]\w*)",
    ];
    let mut line_ends = HashSet::new();
    for pattern in line_patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for c in re.captures_iter(text) {
            let (a, b) = (c[1].to_string(), c[2].to_string());
            let key = if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
            if a != b && line_ends.insert(key) {
                out.push(Instruction::Line {
                    name: None,
                    start_point: a,
                    end_point: b,
                    color: None,
                    width: None,
                });
            }
        }
    }

    let triangle_patterns = [
        r"三角形\s*([A-Za-z]\w*)?\s*[：:]?\s*(?:顶点|由)?\s*([A-Za-z]\w*)\s*[,，]\s*([A-Za-z]\w*)\s*[,，]\s*([A-Za-z]\w*)",
        r"(?i)triangle\s+([A-Za-z]\w*)?\s*(?:with\s+vertices\s+)?([A-Za-z]\w*)\s*,\s*([A-Za-z]\w*)\s*,\s*([A-Za-z]\w*)",
    ];
    for pattern in triangle_patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for c in re.captures_iter(text) {
            out.push(Instruction::Triangle {
                name: c.get(1).map(|m| m.as_str().to_string()),
                points: vec![c[2].to_string(), c[3].to_string(), c[4].to_string()],
                color: None,
                fill_color: None,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_array() {
        let json = r#"[
            {"type": "point", "name": "A", "x": 100, "y": "200"},
            {"type": "line", "start_point": "A", "end_point": "B"},
            {"type": "ratio_point", "line_name": "AB", "ratio": "0.25"}
        ]"#;
        let instructions = parse_instructions(json).unwrap();
        assert_eq!(instructions.len(), 3);
        assert!(matches!(&instructions[0], Instruction::Point { x, y, .. } if *x == 100.0 && *y == 200.0));
        assert!(matches!(&instructions[2], Instruction::RatioPoint { ratio: Some(r), .. } if *r == 0.25));
    }

    #[test]
    fn test_parse_strict_rejects_bad_item() {
        let json = r#"[
            {"type": "point", "name": "A", "x": 1, "y": 2},
            {"type": "point", "name": "B", "x": "abc", "y": 2}
        ]"#;
        let err = parse_instructions(json).unwrap_err();
        assert!(matches!(err, BoardError::MalformedInstructions(msg) if msg.starts_with("item 1")));

        assert!(parse_instructions(r#"{"type": "teleport"}"#).is_err());
        assert!(parse_instructions("42").is_err());
        assert_eq!(
            parse_instructions(r#"{"type": "fixed_point", "point": "O"}"#).unwrap(),
            vec![Instruction::FixedPoint { point: "O".into() }]
        );
    }

    #[test]
    fn test_assistant_reply_fenced_blocks() {
        let reply = "好的，下面是指令：\n```json\n[\n  {\"type\": \"point\", \"name\": \"A\", \"x\": 1, \"y\": 2},\n  {\"type\": \"unknown\"}\n]\n```\n还有：\n```json\n{\"type\": \"fixed_point\", \"point\": \"A\"}\n```";
        let instructions = parse_assistant_reply(reply);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].kind(), "fixed_point");
    }

    #[test]
    fn test_assistant_reply_bare_json() {
        let reply = r#"Here you go: [{"type": "point", "name": "P", "x": 0, "y": 0}] enjoy"#;
        let instructions = parse_assistant_reply(reply);
        assert_eq!(instructions.len(), 1);
    }

    #[test]
    fn test_natural_language_fallback() {
        let reply = "画点A：(100, 200)，点B (300，200)，点C（200, 50）。\n\
                     线段AB：A到B。从B到C画线段。\n\
                     三角形T：A，B，C";
        let instructions = parse_assistant_reply(reply);
        let kinds: Vec<&str> = instructions.iter().map(|i| i.kind()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == "point").count(), 3);
        assert_eq!(kinds.iter().filter(|k| **k == "line").count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == "triangle").count(), 1);

        let english = parse_natural_language("point P at (1.5, -2) and line from P to Q");
        assert_eq!(english.len(), 2);
        assert!(matches!(&english[0], Instruction::Point { x, y, .. } if *x == 1.5 && *y == -2.0));
    }

    #[test]
    fn test_expand_equilateral() {
        let instruction = Instruction::EquilateralTriangle {
            name: Some("T".into()),
            center_x: Some(0.0),
            center_y: Some(0.0),
            side_length: Some(3f64.sqrt()),
        };
        let expanded = instruction.expand().unwrap();
        assert_eq!(expanded.len(), 6);
        assert!(matches!(&expanded[0], Instruction::Point { name: Some(n), y, .. } if n == "TA" && (*y + 1.0).abs() < 1e-12));
        assert!(matches!(&expanded[3], Instruction::Line { name: Some(n), .. } if n == "TAB"));
        assert!(matches!(&expanded[5], Instruction::Line { name: Some(n), .. } if n == "TCA"));
    }

    #[test]
    fn test_expand_regular_polygon() {
        let instruction: Instruction =
            serde_json::from_str(r#"{"type": "regular_polygon", "name": "H", "sides": "5"}"#).unwrap();
        let expanded = instruction.expand().unwrap();
        assert_eq!(expanded.len(), 10);
        assert!(matches!(&expanded[9], Instruction::Line { name: Some(n), .. } if n == "H_边5"));

        let bad: Instruction =
            serde_json::from_str(r#"{"type": "regular_polygon", "sides": 2.5}"#).unwrap();
        assert!(bad.expand().is_err());
    }

    #[test]
    fn test_expand_hand_in_hand() {
        let instruction: Instruction = serde_json::from_str(r#"{"type": "hand_in_hand"}"#).unwrap();
        let expanded = instruction.expand().unwrap();
        assert_eq!(expanded.len(), 17);
        let count = |kind: &str| expanded.iter().filter(|i| i.kind() == kind).count();
        assert_eq!(count("point"), 5);
        assert_eq!(count("fixed_length_line"), 4);
        assert_eq!(count("line"), 4);
        assert_eq!(count("fixed_angle"), 2);
        assert_eq!(count("fixed_point"), 2);

        // A 在左上，C 在左下
        let pos = |name: &str| {
            expanded.iter().find_map(|i| match i {
                Instruction::Point { name: Some(n), x, y, .. } if n == name => Some((*x, *y)),
                _ => None,
            })
        };
        let (ax, ay) = pos("A").unwrap();
        let (cx, cy) = pos("C").unwrap();
        assert!(ax < 400.0 && ay < 300.0);
        assert!(cx < 400.0 && cy > 300.0);

        let bad = Instruction::HandInHand {
            center_x: None,
            center_y: None,
            r1: None,
            r2: None,
            alpha: Some(180.0),
            beta: None,
            theta: None,
        };
        assert!(bad.expand().is_err());
    }
}

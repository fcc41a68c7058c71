//! 视觉属性

use serde::{Deserialize, Serialize};

/// RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
    pub const ORANGE: Color = Color::rgb(255, 165, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);

    /// 多边形默认填充色（半透明淡紫）
    pub const POLYGON_FILL: Color = Color::rgba(230, 230, 255, 100);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// 解析颜色字符串
    ///
    /// 支持 `#RGB`、`#RRGGBB`、`#RRGGBBAA` 以及常见颜色名（英文或中文）
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(hex) = input.strip_prefix('#') {
            return Self::from_hex(hex);
        }

        let named = match input.to_ascii_lowercase().as_str() {
            "black" | "黑" | "黑色" => Self::BLACK,
            "white" | "白" | "白色" => Self::WHITE,
            "red" | "红" | "红色" => Self::RED,
            "green" | "绿" | "绿色" => Self::GREEN,
            "blue" | "蓝" | "蓝色" => Self::BLUE,
            "yellow" | "黄" | "黄色" => Self::YELLOW,
            "cyan" | "青" | "青色" => Self::CYAN,
            "magenta" | "purple" | "紫" | "紫色" => Self::MAGENTA,
            "orange" | "橙" | "橙色" => Self::ORANGE,
            "gray" | "grey" | "灰" | "灰色" => Self::GRAY,
            _ => return None,
        };
        Some(named)
    }

    fn from_hex(hex: &str) -> Option<Self> {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Some(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            8 => Some(Self::rgba(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// 转为十六进制字符串，不透明时省略 alpha
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(Color::parse("#FF0000"), Some(Color::RED));
        assert_eq!(Color::parse("#0f0"), Some(Color::GREEN));
        assert_eq!(Color::parse("#E6E6FF64"), Some(Color::POLYGON_FILL));
        assert_eq!(Color::parse("#12345"), None);
        assert_eq!(Color::parse("#GG0000"), None);
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(Color::parse("Blue"), Some(Color::BLUE));
        assert_eq!(Color::parse("红色"), Some(Color::RED));
        assert_eq!(Color::parse("chartreuse"), None);
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(Color::rgb(0, 128, 255).to_hex(), "#0080FF");
        assert_eq!(Color::POLYGON_FILL.to_hex(), "#E6E6FF64");
    }
}

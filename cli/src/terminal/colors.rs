use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 130, g: 200, b: 255 };
pub const SECONDARY: Color = Color::TrueColor { r: 160, g: 160, b: 180 };
pub const ACCENT: Color = Color::TrueColor { r: 255, g: 190, b: 90 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const REACHABLE: Color = Color::TrueColor { r: 120, g: 220, b: 120 };
pub const UNREACHABLE: Color = Color::TrueColor { r: 230, g: 90, b: 90 };
pub const HIGH_GROWTH: Color = Color::TrueColor { r: 255, g: 140, b: 0 };

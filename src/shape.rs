//! Document shape model.
//!
//! Shapes are a tagged union over six kinds. Style lives beside the geometry
//! so executors can restyle without matching on the kind, and the `note`
//! field is an opaque annotation the agent may use to leave itself hints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{BoxModel, Vec2};
use crate::text::measure_text;

/// Document-unique shape identifier (`shape:<simple>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub const PREFIX: &'static str = "shape:";

    /// Builds an id from the model-facing simple form, adding the prefix once.
    #[must_use]
    pub fn new(simple: impl AsRef<str>) -> Self {
        let simple = simple.as_ref();
        if simple.starts_with(Self::PREFIX) {
            Self(simple.to_string())
        } else {
            Self(format!("{}{simple}", Self::PREFIX))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id without its prefix, as the model sees it.
    #[must_use]
    pub fn simple(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Color {
    #[default]
    Black,
    Grey,
    LightViolet,
    Violet,
    Blue,
    LightBlue,
    Yellow,
    Orange,
    Green,
    LightGreen,
    LightRed,
    Red,
    White,
}

impl Color {
    pub const ALL: [Color; 13] = [
        Self::Black,
        Self::Grey,
        Self::LightViolet,
        Self::Violet,
        Self::Blue,
        Self::LightBlue,
        Self::Yellow,
        Self::Orange,
        Self::Green,
        Self::LightGreen,
        Self::LightRed,
        Self::Red,
        Self::White,
    ];

    /// Lenient lookup: case-insensitive, accepts `gray` and underscores.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let normalized = normalized.replace("gray", "grey");
        Self::ALL.into_iter().find(|color| color.as_str() == normalized)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::Grey => "grey",
            Self::LightViolet => "light-violet",
            Self::Violet => "violet",
            Self::Blue => "blue",
            Self::LightBlue => "light-blue",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Green => "green",
            Self::LightGreen => "light-green",
            Self::LightRed => "light-red",
            Self::Red => "red",
            Self::White => "white",
        }
    }
}

/// Model-facing fill vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fill {
    #[default]
    None,
    Tint,
    Background,
    Solid,
    Pattern,
}

impl Fill {
    pub const ALL: [Fill; 5] = [
        Self::None,
        Self::Tint,
        Self::Background,
        Self::Solid,
        Self::Pattern,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tint => "tint",
            Self::Background => "background",
            Self::Solid => "solid",
            Self::Pattern => "pattern",
        }
    }
}

/// Text-size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    S,
    #[default]
    M,
    L,
    Xl,
}

impl Size {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "small" => Some(Self::S),
            "m" | "medium" => Some(Self::M),
            "l" | "large" => Some(Self::L),
            "xl" | "extra-large" => Some(Self::Xl),
            _ => None,
        }
    }

    #[must_use]
    pub fn font_size(&self) -> f64 {
        match self {
            Self::S => 18.0,
            Self::M => 24.0,
            Self::L => 36.0,
            Self::Xl => 44.0,
        }
    }

    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        match self {
            Self::S => 2.0,
            Self::M => 3.5,
            Self::L => 5.0,
            Self::Xl => 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Start,
    Middle,
    End,
}

impl Align {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" | "left" => Some(Self::Start),
            "middle" | "center" | "centre" => Some(Self::Middle),
            "end" | "right" => Some(Self::End),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    pub color: Color,
    pub fill: Fill,
    pub size: Size,
    pub align: Align,
    pub scale: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            color: Color::Black,
            fill: Fill::None,
            size: Size::M,
            align: Align::Start,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoKind {
    Rectangle,
    Ellipse,
    Triangle,
    Diamond,
    Hexagon,
    Star,
    Cloud,
    Heart,
    Pentagon,
    Octagon,
    XBox,
    CheckBox,
    Trapezoid,
    Rhombus,
    Oval,
}

impl GeoKind {
    pub const ALL: [GeoKind; 15] = [
        Self::Rectangle,
        Self::Ellipse,
        Self::Triangle,
        Self::Diamond,
        Self::Hexagon,
        Self::Star,
        Self::Cloud,
        Self::Heart,
        Self::Pentagon,
        Self::Octagon,
        Self::XBox,
        Self::CheckBox,
        Self::Trapezoid,
        Self::Rhombus,
        Self::Oval,
    ];

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let normalized = match normalized.as_str() {
            "circle" => "ellipse",
            "square" | "rect" => "rectangle",
            "checkbox" => "check-box",
            "xbox" => "x-box",
            other => other,
        };
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Triangle => "triangle",
            Self::Diamond => "diamond",
            Self::Hexagon => "hexagon",
            Self::Star => "star",
            Self::Cloud => "cloud",
            Self::Heart => "heart",
            Self::Pentagon => "pentagon",
            Self::Octagon => "octagon",
            Self::XBox => "x-box",
            Self::CheckBox => "check-box",
            Self::Trapezoid => "trapezoid",
            Self::Rhombus => "rhombus",
            Self::Oval => "oval",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenStyle {
    #[default]
    Smooth,
    Straight,
}

/// Kind-specific geometry. Point lists are relative to the shape position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeKind {
    Geo {
        geo: GeoKind,
        w: f64,
        h: f64,
        text: String,
    },
    Text {
        text: String,
        /// Fixed wrap width; `None` grows with content.
        width: Option<f64>,
    },
    Note {
        text: String,
    },
    Arrow {
        start: Vec2,
        end: Vec2,
        bend: f64,
        text: String,
    },
    Line {
        points: Vec<Vec2>,
    },
    Draw {
        points: Vec<Vec2>,
        closed: bool,
        style: PenStyle,
    },
}

pub const NOTE_SIZE: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    /// Z-order key; larger draws on top.
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub style: ShapeStyle,
    pub kind: ShapeKind,
    #[serde(default)]
    pub note: String,
}

impl Shape {
    #[must_use]
    pub fn new(id: ShapeId, position: Vec2, kind: ShapeKind) -> Self {
        Self {
            id,
            x: position.x,
            y: position.y,
            rotation: 0.0,
            index: 0,
            style: ShapeStyle::default(),
            kind,
            note: String::new(),
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: ShapeStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Discriminator used in model-facing output.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ShapeKind::Geo { geo, .. } => geo.as_str(),
            ShapeKind::Text { .. } => "text",
            ShapeKind::Note { .. } => "note",
            ShapeKind::Arrow { .. } => "arrow",
            ShapeKind::Line { .. } => "line",
            ShapeKind::Draw { .. } => "pen",
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ShapeKind::Geo { text, .. }
            | ShapeKind::Text { text, .. }
            | ShapeKind::Note { text }
            | ShapeKind::Arrow { text, .. } => Some(text),
            ShapeKind::Line { .. } | ShapeKind::Draw { .. } => None,
        }
    }

    /// Replaces the text of text-bearing kinds; returns false otherwise.
    pub fn set_text(&mut self, value: impl Into<String>) -> bool {
        match &mut self.kind {
            ShapeKind::Geo { text, .. }
            | ShapeKind::Text { text, .. }
            | ShapeKind::Note { text }
            | ShapeKind::Arrow { text, .. } => {
                *text = value.into();
                true
            }
            ShapeKind::Line { .. } | ShapeKind::Draw { .. } => false,
        }
    }

    /// Unrotated extent relative to the shape position.
    #[must_use]
    pub fn local_bounds(&self) -> BoxModel {
        let scale = self.style.scale;
        match &self.kind {
            ShapeKind::Geo { w, h, .. } => BoxModel::new(0.0, 0.0, *w, *h),
            ShapeKind::Text { text, width } => {
                let (w, h) = measure_text(text, self.style.size, scale, *width);
                BoxModel::new(0.0, 0.0, width.unwrap_or(w), h)
            }
            ShapeKind::Note { .. } => BoxModel::new(0.0, 0.0, NOTE_SIZE * scale, NOTE_SIZE * scale),
            ShapeKind::Arrow { start, end, .. } => BoxModel::from_points([*start, *end])
                .unwrap_or_default(),
            ShapeKind::Line { points } | ShapeKind::Draw { points, .. } => {
                BoxModel::from_points(points.iter().copied()).unwrap_or_default()
            }
        }
    }

    /// Page-space axis-aligned bounds, accounting for rotation.
    #[must_use]
    pub fn bounds(&self) -> BoxModel {
        let local = self.local_bounds().translated(self.position());
        if self.rotation == 0.0 {
            return local;
        }

        let origin = self.position();
        BoxModel::from_points(
            local
                .corners()
                .into_iter()
                .map(|corner| corner.rotate_around(origin, self.rotation)),
        )
        .unwrap_or(local)
    }
}

/// Which end of an arrow a binding attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(String);

impl BindingId {
    /// One binding per arrow terminal, so the id is derived from both.
    #[must_use]
    pub fn for_terminal(arrow: &ShapeId, terminal: Terminal) -> Self {
        let terminal = match terminal {
            Terminal::Start => "start",
            Terminal::End => "end",
        };
        Self(format!("binding:{}:{terminal}", arrow.simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Arrow terminal attached to another shape. The arrow does not own the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub id: BindingId,
    pub arrow: ShapeId,
    pub target: ShapeId,
    pub terminal: Terminal,
    /// Normalized (0..1) position inside the target bounds.
    pub anchor: Vec2,
}

impl Binding {
    #[must_use]
    pub fn new(arrow: ShapeId, target: ShapeId, terminal: Terminal, anchor: Vec2) -> Self {
        Self {
            id: BindingId::for_terminal(&arrow, terminal),
            arrow,
            target,
            terminal,
            anchor,
        }
    }

    /// Page point the anchor maps to inside `target_bounds`.
    #[must_use]
    pub fn page_point(&self, target_bounds: &BoxModel) -> Vec2 {
        Vec2::new(
            target_bounds.x + self.anchor.x * target_bounds.w,
            target_bounds.y + self.anchor.y * target_bounds.h,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_id_prefix_is_added_once() {
        assert_eq!(ShapeId::new("box").as_str(), "shape:box");
        assert_eq!(ShapeId::new("shape:box").as_str(), "shape:box");
        assert_eq!(ShapeId::new("shape:box").simple(), "box");
    }

    #[test]
    fn lenient_style_parsing() {
        assert_eq!(Color::parse("Light_Blue"), Some(Color::LightBlue));
        assert_eq!(Color::parse("gray"), Some(Color::Grey));
        assert_eq!(Color::parse("magenta"), None);
        assert_eq!(GeoKind::parse("circle"), Some(GeoKind::Ellipse));
        assert_eq!(Align::parse("center"), Some(Align::Middle));
        assert_eq!(Size::parse("XL"), Some(Size::Xl));
    }

    #[test]
    fn rotated_bounds_cover_rotated_corners() {
        let mut shape = Shape::new(
            ShapeId::new("r"),
            Vec2::new(0.0, 0.0),
            ShapeKind::Geo {
                geo: GeoKind::Rectangle,
                w: 100.0,
                h: 50.0,
                text: String::new(),
            },
        );
        shape.rotation = std::f64::consts::FRAC_PI_2;
        let bounds = shape.bounds();
        assert!((bounds.w - 50.0).abs() < 1e-9);
        assert!((bounds.h - 100.0).abs() < 1e-9);
        assert!((bounds.x + 50.0).abs() < 1e-9);
    }

    #[test]
    fn binding_id_is_stable_per_terminal() {
        let arrow = ShapeId::new("a1");
        assert_eq!(
            BindingId::for_terminal(&arrow, Terminal::End).as_str(),
            "binding:a1:end"
        );
        let binding = Binding::new(arrow, ShapeId::new("t"), Terminal::Start, Vec2::new(0.5, 0.5));
        let point = binding.page_point(&BoxModel::new(100.0, 100.0, 200.0, 40.0));
        assert_eq!(point, Vec2::new(200.0, 120.0));
    }
}

use egui::{pos2, Color32, Pos2, Rect, Vec2};
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

use crate::geometry;

pub type AnnotationId = u64;

/// Horizontal padding around a text block, in image units.
pub const TEXT_PADDING_X: f32 = 8.0;
/// Vertical padding around a text block, in image units.
pub const TEXT_PADDING_Y: f32 = 4.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tool {
    Select,
    Move,
    Rectangle,
    Ellipse,
    Line,
    Arrow,
    Text,
    Pin,
    Pixelate,
    Eraser,
    Highlighter,
    Spotlight,
    Emoji,
    Pen,
    Crop,
    Blur,
    Eyedropper,
    Callout,
    Magnifier,
    Ruler,
}

impl Tool {
    pub const ALL: [Tool; 20] = [
        Tool::Select,
        Tool::Move,
        Tool::Rectangle,
        Tool::Ellipse,
        Tool::Line,
        Tool::Arrow,
        Tool::Text,
        Tool::Pin,
        Tool::Pixelate,
        Tool::Eraser,
        Tool::Highlighter,
        Tool::Spotlight,
        Tool::Emoji,
        Tool::Pen,
        Tool::Crop,
        Tool::Blur,
        Tool::Eyedropper,
        Tool::Callout,
        Tool::Magnifier,
        Tool::Ruler,
    ];

    /// Tools that create an annotation by dragging out its geometry.
    pub fn draws_by_drag(self) -> bool {
        matches!(
            self,
            Tool::Rectangle
                | Tool::Ellipse
                | Tool::Line
                | Tool::Arrow
                | Tool::Pixelate
                | Tool::Highlighter
                | Tool::Spotlight
                | Tool::Pen
                | Tool::Blur
                | Tool::Callout
                | Tool::Magnifier
                | Tool::Ruler
        )
    }

    /// Tools that place an annotation with a single click.
    pub fn places_on_click(self) -> bool {
        matches!(self, Tool::Text | Tool::Pin | Tool::Emoji)
    }

    /// Tools that stay active after placing, allowing consecutive placements.
    pub fn stays_active(self) -> bool {
        matches!(self, Tool::Pen | Tool::Pin | Tool::Emoji)
    }

    pub fn uses_endpoints(self) -> bool {
        matches!(self, Tool::Line | Tool::Arrow | Tool::Ruler)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::Select => "Select",
            Tool::Move => "Move",
            Tool::Rectangle => "Rectangle",
            Tool::Ellipse => "Ellipse",
            Tool::Line => "Line",
            Tool::Arrow => "Arrow",
            Tool::Text => "Text",
            Tool::Pin => "Pin",
            Tool::Pixelate => "Pixelate",
            Tool::Eraser => "Eraser",
            Tool::Highlighter => "Highlighter",
            Tool::Spotlight => "Spotlight",
            Tool::Emoji => "Emoji",
            Tool::Pen => "Pen",
            Tool::Crop => "Crop",
            Tool::Blur => "Blur",
            Tool::Eyedropper => "Eyedropper",
            Tool::Callout => "Callout",
            Tool::Magnifier => "Magnifier",
            Tool::Ruler => "Ruler",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Stroke,
    Fill,
    Both,
}

impl FillMode {
    pub fn fills(self) -> bool {
        matches!(self, Self::Fill | Self::Both)
    }

    pub fn strokes(self) -> bool {
        matches!(self, Self::Stroke | Self::Both)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PinShape {
    #[default]
    Circle,
    Square,
    RoundedSquare,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SpotlightShape {
    #[default]
    Ellipse,
    Rectangle,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BlurMode {
    #[default]
    Full,
    TextOnly,
    Erase,
    TextErase,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TailDirection {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BrushKind {
    #[default]
    Solid,
    Dashed,
    Marker,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextSize(f32);

impl TextSize {
    pub const MIN: f32 = 8.0;
    pub const MAX: f32 = 96.0;
    pub const S: Self = Self(14.0);
    pub const M: Self = Self(18.0);
    pub const L: Self = Self(24.0);

    pub fn from_points(points: f32) -> Self {
        Self(points.clamp(Self::MIN, Self::MAX))
    }

    pub fn points(self) -> f32 {
        self.0
    }
}

impl Default for TextSize {
    fn default() -> Self {
        Self::M
    }
}

impl Serialize for TextSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f32(self.0)
    }
}

impl<'de> Deserialize<'de> for TextSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TextSizeVisitor;

        impl<'de> Visitor<'de> for TextSizeVisitor {
            type Value = TextSize;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("font size in points or one of S/M/L")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(TextSize::from_points(value.min(TextSize::MAX as u64) as f32))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(TextSize::from_points(value.max(0) as f32))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(TextSize::from_points(value as f32))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match value {
                    "S" | "s" => Ok(TextSize::S),
                    "M" | "m" => Ok(TextSize::M),
                    "L" | "l" => Ok(TextSize::L),
                    other => {
                        let parsed = other.parse::<f32>().map_err(|_| {
                            E::custom(format!("invalid text size '{other}', expected S/M/L or number"))
                        })?;
                        Ok(TextSize::from_points(parsed))
                    }
                }
            }
        }

        deserializer.deserialize_any(TextSizeVisitor)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_pos2(self) -> Pos2 {
        Pos2::new(self.x, self.y)
    }

    pub fn from_pos2(value: Pos2) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }

    pub fn delta(self, other: Point) -> Vec2 {
        Vec2::new(other.x - self.x, other.y - self.y)
    }

    pub fn offset(self, delta: Vec2) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RectData {
    pub min: Point,
    pub max: Point,
}

impl RectData {
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Point::new(x, y),
            max: Point::new(x + width, y + height),
        }
        .normalize()
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        Self { min: a, max: b }.normalize()
    }

    pub fn normalize(self) -> Self {
        let min_x = self.min.x.min(self.max.x);
        let min_y = self.min.y.min(self.max.y);
        let max_x = self.min.x.max(self.max.x);
        let max_y = self.min.y.max(self.max.y);
        Self {
            min: Point { x: min_x, y: min_y },
            max: Point { x: max_x, y: max_y },
        }
    }

    pub fn to_rect(self) -> Rect {
        let norm = self.normalize();
        Rect::from_min_max(norm.min.to_pos2(), norm.max.to_pos2())
    }

    pub fn from_rect(value: Rect) -> Self {
        Self {
            min: Point::from_pos2(value.min),
            max: Point::from_pos2(value.max),
        }
        .normalize()
    }

    pub fn width(self) -> f32 {
        (self.max.x - self.min.x).abs()
    }

    pub fn height(self) -> f32 {
        (self.max.y - self.min.y).abs()
    }

    pub fn translate(self, delta: Vec2) -> Self {
        Self {
            min: self.min.offset(delta),
            max: self.max.offset(delta),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Handle {
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    Start,
    End,
    Control,
}

impl Handle {
    pub fn is_corner(self) -> bool {
        matches!(
            self,
            Self::TopLeft | Self::TopRight | Self::BottomRight | Self::BottomLeft
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Style {
    pub color: [u8; 4],
    pub line_width: f32,
    pub opacity: f32,
    pub dashed: bool,
    pub sketch: bool,
    pub fill_mode: FillMode,
    pub corner_radius: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: [229, 62, 62, 255],
            line_width: 3.0,
            opacity: 1.0,
            dashed: false,
            sketch: false,
            fill_mode: FillMode::Stroke,
            corner_radius: 0.0,
        }
    }
}

impl Style {
    pub fn color32(&self) -> Color32 {
        Color32::from_rgba_unmultiplied(self.color[0], self.color[1], self.color[2], self.color[3])
    }

    pub fn clamped_opacity(&self) -> f32 {
        self.opacity.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Endpoints {
    pub start: Point,
    pub end: Point,
    pub control: Option<Point>,
}

impl Endpoints {
    pub fn span(&self) -> Rect {
        Rect::from_two_pos(self.start.to_pos2(), self.end.to_pos2())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TextBox {
    pub origin: Point,
    pub content: String,
    #[serde(default)]
    pub size: TextSize,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub background: Option<[u8; 4]>,
    /// Block size measured with the loaded font. Cleared whenever the
    /// content changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<[f32; 2]>,
}

impl TextBox {
    pub fn block_size(&self) -> Vec2 {
        match self.measured {
            Some([width, height]) => Vec2::new(width, height),
            None => text_block_size(&self.content, self.size.points(), self.bold),
        }
    }

    /// Text block plus padding, in image units.
    pub fn padded_rect(&self) -> Rect {
        let size = self.block_size();
        Rect::from_min_size(
            self.origin.to_pos2(),
            size + Vec2::new(TEXT_PADDING_X * 2.0, TEXT_PADDING_Y * 2.0),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum AnnotationKind {
    Rectangle {
        rect: RectData,
    },
    Ellipse {
        rect: RectData,
    },
    Line {
        start: Point,
        end: Point,
    },
    Arrow {
        start: Point,
        end: Point,
        control: Option<Point>,
    },
    Ruler {
        start: Point,
        end: Point,
    },
    Text(TextBox),
    Pin {
        rect: RectData,
        number: u32,
        shape: PinShape,
    },
    Pixelate {
        rect: RectData,
        block_size: u32,
    },
    Highlighter {
        rect: RectData,
    },
    Spotlight {
        rect: RectData,
        shape: SpotlightShape,
    },
    Emoji {
        rect: RectData,
        glyph: String,
    },
    Pen {
        path: Vec<Point>,
        brush: BrushKind,
    },
    Blur {
        rect: RectData,
        radius: f32,
        mode: BlurMode,
    },
    Callout {
        rect: RectData,
        text: String,
        size: TextSize,
        tail: TailDirection,
    },
    Magnifier {
        rect: RectData,
        magnification: f32,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub style: Style,
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn new(id: AnnotationId, style: Style, kind: AnnotationKind) -> Self {
        Self { id, style, kind }
    }

    pub fn tool(&self) -> Tool {
        match &self.kind {
            AnnotationKind::Rectangle { .. } => Tool::Rectangle,
            AnnotationKind::Ellipse { .. } => Tool::Ellipse,
            AnnotationKind::Line { .. } => Tool::Line,
            AnnotationKind::Arrow { .. } => Tool::Arrow,
            AnnotationKind::Ruler { .. } => Tool::Ruler,
            AnnotationKind::Text(_) => Tool::Text,
            AnnotationKind::Pin { .. } => Tool::Pin,
            AnnotationKind::Pixelate { .. } => Tool::Pixelate,
            AnnotationKind::Highlighter { .. } => Tool::Highlighter,
            AnnotationKind::Spotlight { .. } => Tool::Spotlight,
            AnnotationKind::Emoji { .. } => Tool::Emoji,
            AnnotationKind::Pen { .. } => Tool::Pen,
            AnnotationKind::Blur { .. } => Tool::Blur,
            AnnotationKind::Callout { .. } => Tool::Callout,
            AnnotationKind::Magnifier { .. } => Tool::Magnifier,
        }
    }

    /// The stored rect for kinds whose geometry is a rectangle.
    pub fn stored_rect(&self) -> Option<RectData> {
        match &self.kind {
            AnnotationKind::Rectangle { rect }
            | AnnotationKind::Ellipse { rect }
            | AnnotationKind::Pin { rect, .. }
            | AnnotationKind::Pixelate { rect, .. }
            | AnnotationKind::Highlighter { rect }
            | AnnotationKind::Spotlight { rect, .. }
            | AnnotationKind::Emoji { rect, .. }
            | AnnotationKind::Blur { rect, .. }
            | AnnotationKind::Callout { rect, .. }
            | AnnotationKind::Magnifier { rect, .. } => Some(*rect),
            _ => None,
        }
    }

    pub fn rect_is_authoritative(&self) -> bool {
        self.stored_rect().is_some()
    }

    /// Axis-aligned bounds in image space. Derived for non-rect kinds.
    pub fn bounding_rect(&self) -> Rect {
        if let Some(rect) = self.stored_rect() {
            return rect.to_rect();
        }
        match &self.kind {
            AnnotationKind::Line { start, end } | AnnotationKind::Ruler { start, end } => {
                Rect::from_two_pos(start.to_pos2(), end.to_pos2())
            }
            AnnotationKind::Arrow { start, end, .. } => {
                Rect::from_two_pos(start.to_pos2(), end.to_pos2())
            }
            AnnotationKind::Text(text) => text.padded_rect(),
            AnnotationKind::Pen { path, .. } => {
                let points: Vec<Pos2> = path.iter().map(|p| p.to_pos2()).collect();
                geometry::bounding_rect(&points).unwrap_or(Rect::NOTHING)
            }
            _ => Rect::NOTHING,
        }
    }

    pub fn endpoints(&self) -> Option<Endpoints> {
        match &self.kind {
            AnnotationKind::Line { start, end } | AnnotationKind::Ruler { start, end } => {
                Some(Endpoints {
                    start: *start,
                    end: *end,
                    control: None,
                })
            }
            AnnotationKind::Arrow {
                start,
                end,
                control,
            } => Some(Endpoints {
                start: *start,
                end: *end,
                control: *control,
            }),
            _ => None,
        }
    }

    /// Writes new endpoints; returns false for kinds without endpoints.
    pub fn set_endpoints(&mut self, endpoints: Endpoints) -> bool {
        match &mut self.kind {
            AnnotationKind::Line { start, end } | AnnotationKind::Ruler { start, end } => {
                *start = endpoints.start;
                *end = endpoints.end;
                true
            }
            AnnotationKind::Arrow {
                start,
                end,
                control,
            } => {
                *start = endpoints.start;
                *end = endpoints.end;
                *control = endpoints.control;
                true
            }
            _ => false,
        }
    }

    /// Fits the annotation into `rect`. Rect kinds store it directly, the
    /// others are remapped from their current bounds.
    pub fn set_rect(&mut self, rect: RectData) {
        let rect = rect.normalize();
        let old = self.bounding_rect();
        match &mut self.kind {
            AnnotationKind::Rectangle { rect: r }
            | AnnotationKind::Ellipse { rect: r }
            | AnnotationKind::Pin { rect: r, .. }
            | AnnotationKind::Pixelate { rect: r, .. }
            | AnnotationKind::Highlighter { rect: r }
            | AnnotationKind::Spotlight { rect: r, .. }
            | AnnotationKind::Emoji { rect: r, .. }
            | AnnotationKind::Blur { rect: r, .. }
            | AnnotationKind::Callout { rect: r, .. }
            | AnnotationKind::Magnifier { rect: r, .. } => *r = rect,
            AnnotationKind::Text(text) => {
                text.origin = rect.min;
            }
            _ => {
                let new = rect.to_rect();
                self.map_points(|p| remap(p, old, new));
            }
        }
    }

    pub fn move_by(&mut self, delta: Vec2) {
        self.map_points(|p| p + delta);
    }

    /// Applies `f` to every stored coordinate. Rects are re-normalized so
    /// mirroring or quarter turns keep non-negative extents.
    pub fn map_points(&mut self, f: impl Fn(Pos2) -> Pos2) {
        let map = |p: &mut Point| *p = Point::from_pos2(f(p.to_pos2()));
        match &mut self.kind {
            AnnotationKind::Rectangle { rect }
            | AnnotationKind::Ellipse { rect }
            | AnnotationKind::Pin { rect, .. }
            | AnnotationKind::Pixelate { rect, .. }
            | AnnotationKind::Highlighter { rect }
            | AnnotationKind::Spotlight { rect, .. }
            | AnnotationKind::Emoji { rect, .. }
            | AnnotationKind::Blur { rect, .. }
            | AnnotationKind::Callout { rect, .. }
            | AnnotationKind::Magnifier { rect, .. } => {
                map(&mut rect.min);
                map(&mut rect.max);
                *rect = rect.normalize();
            }
            AnnotationKind::Line { start, end } | AnnotationKind::Ruler { start, end } => {
                map(start);
                map(end);
            }
            AnnotationKind::Arrow {
                start,
                end,
                control,
            } => {
                map(start);
                map(end);
                if let Some(control) = control {
                    map(control);
                }
            }
            AnnotationKind::Text(text) => {
                // Text stays upright, so follow the block's centre.
                let bounds = text.padded_rect();
                let center = f(bounds.center());
                let moved = center - bounds.center();
                text.origin = text.origin.offset(moved);
            }
            AnnotationKind::Pen { path, .. } => path.iter_mut().for_each(map),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Text(text) => Some(&text.content),
            AnnotationKind::Callout { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Replaces the text content, returning the previous string.
    pub fn set_text(&mut self, value: String) -> Option<String> {
        match &mut self.kind {
            AnnotationKind::Text(text) => {
                text.measured = None;
                Some(std::mem::replace(&mut text.content, value))
            }
            AnnotationKind::Callout { text, .. } => Some(std::mem::replace(text, value)),
            _ => None,
        }
    }

    /// True when the committed geometry honours the per-kind invariants.
    pub fn is_well_formed(&self) -> bool {
        match &self.kind {
            AnnotationKind::Pen { path, .. } => !path.is_empty(),
            _ => {
                let r = self.bounding_rect();
                r.width() >= 0.0 && r.height() >= 0.0
            }
        }
    }
}

fn remap(p: Pos2, from: Rect, to: Rect) -> Pos2 {
    let sx = if from.width() > f32::EPSILON {
        to.width() / from.width()
    } else {
        1.0
    };
    let sy = if from.height() > f32::EPSILON {
        to.height() / from.height()
    } else {
        1.0
    };
    pos2(
        to.min.x + (p.x - from.min.x) * sx,
        to.min.y + (p.y - from.min.y) * sy,
    )
}

/// Estimated size of a text block, for when no font has measured it.
pub fn text_block_size(content: &str, font_size: f32, bold: bool) -> Vec2 {
    let advance = if bold { 0.64 } else { 0.6 };
    let lines: Vec<&str> = if content.is_empty() {
        vec![""]
    } else {
        content.split('\n').collect()
    };
    let widest = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0)
        .max(1);
    let width = (widest as f32 * font_size * advance).max(font_size);
    let height = lines.len() as f32 * line_height(font_size);
    Vec2::new(width, height)
}

pub fn line_height(font_size: f32) -> f32 {
    font_size * 1.3
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Builds a polygon from a flat `[x0, y0, x1, y1, ...]` list, the shape
    /// most OCR services report bounding polygons in. A dangling coordinate is
    /// ignored.
    pub fn from_flat(coords: &[f32]) -> Self {
        Self {
            points: coords
                .chunks_exact(2)
                .map(|pair| Point::new(pair[0], pair[1]))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn mean_y(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|point| point.y).sum::<f32>() / self.points.len() as f32
    }

    pub fn min_corner(&self) -> Point {
        let mut iter = self.points.iter();
        let Some(first) = iter.next() else {
            return Point::new(0.0, 0.0);
        };
        iter.fold(*first, |acc, point| {
            Point::new(acc.x.min(point.x), acc.y.min(point.y))
        })
    }

    pub fn translate_y(&self, dy: f32) -> Self {
        self.map(|point| Point::new(point.x, point.y + dy))
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        self.map(|point| Point::new(point.x * sx, point.y * sy))
    }

    /// Stretches every vertex away from the minimum corner by the given
    /// factors, keeping that corner fixed.
    pub fn expand_from_min(&self, width_factor: f32, height_factor: f32) -> Self {
        let anchor = self.min_corner();
        self.map(|point| {
            Point::new(
                anchor.x + (point.x - anchor.x) * width_factor,
                anchor.y + (point.y - anchor.y) * height_factor,
            )
        })
    }

    fn map(&self, f: impl Fn(&Point) -> Point) -> Self {
        Self {
            points: self.points.iter().map(f).collect(),
        }
    }
}

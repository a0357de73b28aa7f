pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

/// An axis-aligned face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// True when both sides lie within `[min_size, max_size]`.
    /// A `max_size` of 0 means unbounded.
    pub fn fits(&self, min_size: u32, max_size: u32) -> bool {
        let min = min_size as i32;
        let within_min = self.width >= min && self.height >= min;
        let within_max =
            max_size == 0 || (self.width <= max_size as i32 && self.height <= max_size as i32);
        within_min && within_max
    }

    /// Intersects the region with a `width x height` frame.
    /// Returns `None` when nothing of the region is visible.
    pub fn clamp(&self, width: u32, height: u32) -> Option<Region> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = (self.x + self.width).min(width as i32);
        let y2 = (self.y + self.height).min(height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Greedy deduplication: keeps a region only if its IoU with every
    /// previously-kept region is at or below the threshold.
    pub fn deduplicate(regions: &[Region], iou_threshold: f64) -> Vec<Region> {
        if regions.len() <= 1 {
            return regions.to_vec();
        }
        let mut kept: Vec<Region> = Vec::with_capacity(regions.len());
        for r in regions {
            let dominated = kept.iter().any(|k| r.iou(k) > iou_threshold);
            if !dominated {
                kept.push(*r);
            }
        }
        kept
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        inter / ((self.area() + other.area()) as f64 - inter)
    }
}

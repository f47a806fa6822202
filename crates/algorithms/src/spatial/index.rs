//! Bounding-box spatial index

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use swn_core::vector::LineStringZ;

/// Number of geometries at which an R*-tree is built; fewer are scanned
pub const RTREE_THRESHOLD: usize = 100;

/// Axis-aligned bounding box as (min_x, min_y, max_x, max_y)
pub type Bbox = (f64, f64, f64, f64);

type Entry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Bounding box of a line string
pub fn line_bbox(line: &LineStringZ) -> Bbox {
    line.coords().iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(min_x, min_y, max_x, max_y), c| {
            (min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y))
        },
    )
}

fn bbox_intersects(a: &Bbox, b: &Bbox) -> bool {
    a.0 <= b.2 && a.2 >= b.0 && a.1 <= b.3 && a.3 >= b.1
}

/// Index of bounding boxes, answering with positions into the source slice
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    bboxes: Vec<Bbox>,
    tree: Option<RTree<Entry>>,
}

impl SpatialIndex {
    /// Index `bboxes`; the R*-tree is only built at [`RTREE_THRESHOLD`] or more
    pub fn new(bboxes: Vec<Bbox>) -> Self {
        let tree = (bboxes.len() >= RTREE_THRESHOLD).then(|| {
            let entries = bboxes
                .iter()
                .enumerate()
                .map(|(i, b)| GeomWithData::new(Rectangle::from_corners([b.0, b.1], [b.2, b.3]), i))
                .collect();
            RTree::bulk_load(entries)
        });
        Self { bboxes, tree }
    }

    /// Index the bounding boxes of lines
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a LineStringZ>,
    {
        Self::new(lines.into_iter().map(line_bbox).collect())
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// Whether queries go through the R*-tree
    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    /// Sorted positions of boxes that intersect `bbox`
    pub fn intersecting_bbox(&self, bbox: Bbox) -> Vec<usize> {
        let mut found: Vec<usize> = match &self.tree {
            Some(tree) => {
                let envelope = AABB::from_corners([bbox.0, bbox.1], [bbox.2, bbox.3]);
                tree.locate_in_envelope_intersecting(&envelope)
                    .map(|e| e.data)
                    .collect()
            }
            None => self
                .bboxes
                .iter()
                .enumerate()
                .filter(|(_, b)| bbox_intersects(b, &bbox))
                .map(|(i, _)| i)
                .collect(),
        };
        found.sort_unstable();
        found
    }

    /// Sorted positions of boxes that contain the point
    pub fn intersecting_point(&self, x: f64, y: f64) -> Vec<usize> {
        self.intersecting_bbox((x, y, x, y))
    }
}

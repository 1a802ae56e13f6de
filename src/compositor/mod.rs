mod compose;
mod geom;
mod split;

pub use compose::{composite, Composite};
pub use geom::{Point, Polygon};
pub use split::{
    assign_regions, redact_single, split_redactions, PageSpace, RedactedImage, RedactedPair,
    RedactionRegion, RedactionStyle, RegionKind, SplitPlan,
};

pub mod bone;
pub mod calibration;
pub mod rig;

pub use bone::{FingerBone, FingerJoint, HumanBone, Side};
pub use calibration::{BodyGeometry, BoneReference, Calibration, RigState, SkeletonReference};
pub use rig::{BoneTransform, Rig, RigFile, SkeletonRig};

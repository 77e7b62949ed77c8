pub mod body;
pub mod face;
pub mod hand;
pub mod math;
pub mod smooth;

pub use body::{BodyRetargeter, BodyTargets, FallbackVectors, LimbTargets};
pub use face::{BlinkCycle, FaceFrame, FaceRetargeter, GazeTracker};
pub use hand::HandRetargeter;
pub use smooth::{BodyBlend, BoneRuntime, BoneRuntimeState, FingerSmoother};

pub mod blendshape;
pub mod config;
pub mod ik;
pub mod landmark;
pub mod osc;
pub mod pipeline;
pub mod protocol;
pub mod retarget;
pub mod server;
pub mod skeleton;

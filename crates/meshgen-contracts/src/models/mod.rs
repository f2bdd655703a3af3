mod registry;
mod selectors;

pub use registry::{
    ModelRegistry, ModelSpec, CAPABILITY_ANIMATION, CAPABILITY_MESH, CAPABILITY_PREVIEW_IMAGE,
    CAPABILITY_PREVIEW_VIDEO,
};
pub use selectors::{ModelSelection, ModelSelector};

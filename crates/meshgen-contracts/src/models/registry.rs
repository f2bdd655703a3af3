use indexmap::IndexMap;

pub const CAPABILITY_MESH: &str = "mesh";
pub const CAPABILITY_PREVIEW_IMAGE: &str = "preview_image";
pub const CAPABILITY_PREVIEW_VIDEO: &str = "preview_video";
pub const CAPABILITY_ANIMATION: &str = "animation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub backend: String,
    pub capabilities: Vec<String>,
    pub description: Option<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, backend: &str, capabilities: &[&str], description: &str| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                backend: backend.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                description: Some(description.to_string()),
            },
        );
    };

    insert(
        "veo-2.0-generate-001",
        "veo",
        &[
            CAPABILITY_MESH,
            CAPABILITY_PREVIEW_VIDEO,
            CAPABILITY_ANIMATION,
        ],
        "Long-running job; mesh plus short preview video, or mesh animation.",
    );
    insert(
        "gemini-2.0-flash-preview-image-generation",
        "gemini",
        &[CAPABILITY_MESH, CAPABILITY_PREVIEW_IMAGE],
        "Immediate response; mesh plus still preview image.",
    );
    insert(
        "dryrun-mesh-1",
        "dryrun",
        &[
            CAPABILITY_MESH,
            CAPABILITY_PREVIEW_IMAGE,
            CAPABILITY_ANIMATION,
        ],
        "Local deterministic box mesh for offline runs.",
    );

    map
}

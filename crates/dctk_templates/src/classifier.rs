//! Structural classification of templates.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Folder holding the container definition files.
pub const CONTAINER_DIR: &str = ".devcontainer";

/// Dockerfile name inside [`CONTAINER_DIR`].
pub const DOCKERFILE: &str = "Dockerfile";

/// Compose file names recognized inside [`CONTAINER_DIR`].
pub const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Configuration file name inside [`CONTAINER_DIR`].
pub const CONFIG_FILE: &str = "devcontainer.json";

/// Configuration file name at the template root.
pub const ROOT_CONFIG_FILE: &str = ".devcontainer.json";

/// How a template's container is defined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TemplateType {
    Image,
    Dockerfile,
    DockerCompose,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::Image => "image",
            TemplateType::Dockerfile => "dockerfile",
            TemplateType::DockerCompose => "dockerCompose",
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a template from the files it ships.
///
/// A Dockerfile wins over a compose file, which wins over a plain image.
/// Nothing in the manifest is consulted.
pub fn classify(template_dir: &Path) -> TemplateType {
    let container_dir = template_dir.join(CONTAINER_DIR);

    if container_dir.join(DOCKERFILE).is_file() {
        TemplateType::Dockerfile
    } else if compose_file(template_dir).is_some() {
        TemplateType::DockerCompose
    } else {
        TemplateType::Image
    }
}

/// Locate the compose file, if any.
pub fn compose_file(template_dir: &Path) -> Option<PathBuf> {
    let container_dir = template_dir.join(CONTAINER_DIR);
    COMPOSE_FILES
        .iter()
        .map(|name| container_dir.join(name))
        .find(|path| path.is_file())
}

/// Locate the devcontainer configuration file, if any.
pub fn config_file(template_dir: &Path) -> Option<PathBuf> {
    [
        template_dir.join(CONTAINER_DIR).join(CONFIG_FILE),
        template_dir.join(ROOT_CONFIG_FILE),
    ]
    .into_iter()
    .find(|path| path.is_file())
}

/// Whether a folder is itself a template rather than a folder of templates.
pub fn is_template_dir(dir: &Path) -> bool {
    dir.join(crate::manifest::MANIFEST_FILE).is_file()
        || config_file(dir).is_some()
        || dir.join(CONTAINER_DIR).join(DOCKERFILE).is_file()
        || compose_file(dir).is_some()
}

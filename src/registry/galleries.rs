use std::collections::HashSet;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use thiserror::Error;

pub type GalleryId = i64;

/// A tracked discussion board. Immutable once configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gallery {
    pub id: GalleryId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("gallery id {0} is registered more than once")]
    DuplicateGallery(GalleryId),
    #[error("gallery {0} has an empty listing url")]
    MissingUrl(GalleryId),
}

/// Ordered, static set of galleries handed to the collector at construction.
#[derive(Debug, Clone)]
pub struct Registry {
    galleries: Vec<Gallery>,
}

impl Registry {
    pub fn new(galleries: Vec<Gallery>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for gallery in &galleries {
            if !seen.insert(gallery.id) {
                return Err(ConfigError::DuplicateGallery(gallery.id));
            }
            if gallery.url.trim().is_empty() {
                return Err(ConfigError::MissingUrl(gallery.id));
            }
        }
        Ok(Self { galleries })
    }

    pub fn defaults() -> Self {
        Self {
            galleries: vec![
                Gallery {
                    id: 1,
                    name: "Baseball".to_string(),
                    url: "https://gall.dcinside.com/board/lists/?id=baseball".to_string(),
                },
                Gallery {
                    id: 2,
                    name: "Soccer".to_string(),
                    url: "https://gall.dcinside.com/board/lists/?id=soccer".to_string(),
                },
            ],
        }
    }

    /// Reads a JSON array of `{id, name, url}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read galleries file: {:?}", path))?;
        let galleries: Vec<Gallery> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse galleries file: {:?}", path))?;
        Ok(Self::new(galleries)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gallery> {
        self.galleries.iter()
    }

    pub fn as_slice(&self) -> &[Gallery] {
        &self.galleries
    }

    pub fn len(&self) -> usize {
        self.galleries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.galleries.is_empty()
    }
}

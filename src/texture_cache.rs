use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::texture::{Texture, TextureError};

/// Thread-safe store of decoded textures keyed by source path.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: Arc<RwLock<HashMap<PathBuf, Arc<Texture>>>>,
}

impl Clone for TextureCache {
    fn clone(&self) -> Self {
        Self {
            textures: Arc::clone(&self.textures),
        }
    }
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached texture for `path`, decoding it on first use.
    pub fn get_or_load<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Texture>, TextureError> {
        let path = path.as_ref();
        if let Some(texture) = self.get(path) {
            return Ok(texture);
        }
        let texture = Arc::new(Texture::load(path)?);
        debug!(
            "loaded texture {} ({}x{})",
            path.display(),
            texture.width(),
            texture.height()
        );
        let mut guard = self.textures.write();
        let entry = guard
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&texture));
        Ok(Arc::clone(entry))
    }

    /// Registers a texture built in memory under a synthetic key.
    pub fn insert(&self, key: impl Into<PathBuf>, texture: Texture) -> Arc<Texture> {
        let texture = Arc::new(texture);
        self.textures.write().insert(key.into(), Arc::clone(&texture));
        texture
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Texture>> {
        self.textures.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.textures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clones_share_storage() {
        let cache = TextureCache::new();
        let other = cache.clone();
        let texture = Texture::checkerboard(2, 2, [0; 4], [255; 4]).unwrap();
        cache.insert("builtin:checker", texture);
        assert!(other.get(Path::new("builtin:checker")).is_some());
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn loads_each_file_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbaImage::from_pixel(1, 1, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let cache = TextureCache::new();
        let first = cache.get_or_load(&path).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.as_bytes(), &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let cache = TextureCache::new();
        assert!(cache.get_or_load("does/not/exist.png").is_err());
        assert!(cache.is_empty());
    }
}

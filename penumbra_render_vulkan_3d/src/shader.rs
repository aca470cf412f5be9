use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("Failed to read shader {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader blob of {len} bytes is not a whole number of SPIR-V words")]
    Misaligned { len: usize },

    #[error("Shader blob starts with {found:#010x}, not the SPIR-V magic number")]
    BadMagic { found: u32 },
}

/// Reinterprets a little-endian SPIR-V blob as 32-bit words.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned { len: bytes.len() });
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word.copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&found) => Err(ShaderError::BadMagic { found }),
        None => Err(ShaderError::Misaligned { len: 0 }),
    }
}

pub fn load_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let bytes = fs::read(path).map_err(|source| ShaderError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let words = spirv_words(&bytes)?;
    debug!(path = %path.display(), words = words.len(), "SPIR-V loaded");
    Ok(words)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderProgram {
    /// Loads `<name>.vert.spv` and `<name>.frag.spv` from `dir`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, ShaderError> {
        Ok(Self {
            vertex: load_spirv(&dir.join(format!("{name}.vert.spv")))?,
            fragment: load_spirv(&dir.join(format!("{name}.frag.spv")))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    pub shadow_map: ShaderProgram,
    pub lightning_simple: ShaderProgram,
    pub lightning_shadowmap: ShaderProgram,
    pub mesh: ShaderProgram,
}

impl ShaderLibrary {
    pub fn load(dir: &Path) -> Result<Self, ShaderError> {
        Ok(Self {
            shadow_map: ShaderProgram::load(dir, "shadow_map")?,
            lightning_simple: ShaderProgram::load(dir, "lightning_simple")?,
            lightning_shadowmap: ShaderProgram::load(dir, "lightning_shadowmap")?,
            mesh: ShaderProgram::load(dir, "mesh")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_magic_prefixed_blob() {
        let words = spirv_words(&blob(&[SPIRV_MAGIC, 0x0001_0600, 7])).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0600, 7]);
    }

    #[test]
    fn rejects_unaligned_and_empty_blobs() {
        let mut bytes = blob(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(
            spirv_words(&bytes),
            Err(ShaderError::Misaligned { len: 5 })
        ));
        assert!(matches!(
            spirv_words(&[]),
            Err(ShaderError::Misaligned { len: 0 })
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let error = spirv_words(&blob(&[SPIRV_MAGIC.swap_bytes()])).unwrap_err();
        assert!(matches!(error, ShaderError::BadMagic { found } if found == SPIRV_MAGIC.swap_bytes()));
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = ShaderProgram::load(Path::new("/nonexistent/shaders"), "mesh").unwrap_err();
        assert!(error.to_string().contains("mesh.vert.spv"));
    }
}

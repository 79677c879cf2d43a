// Shaders - SPIR-V loading, offline compilation and hot reload
//
// Sources are GLSL next to their binaries: `triangle.vert` compiles to
// `triangle.vert.spv`. A binary is stale when it is missing or not strictly
// newer than its source.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;

use crate::rhi::{ShaderModuleDesc, ShaderStages};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, accepting either endianness
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    anyhow::ensure!(
        !bytes.is_empty() && bytes.len() % 4 == 0,
        "SPIR-V size {} is not a non-zero multiple of 4",
        bytes.len()
    );

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    match words[0] {
        SPIRV_MAGIC => {}
        magic if magic.swap_bytes() == SPIRV_MAGIC => {
            for word in &mut words {
                *word = word.swap_bytes();
            }
        }
        magic => anyhow::bail!("Bad SPIR-V magic number {:#010x}", magic),
    }
    Ok(words)
}

pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read shader binary: {:?}", path))?;
    parse_spirv(&bytes).with_context(|| format!("Invalid shader binary: {:?}", path))
}

/// Pipeline stage implied by a GLSL source extension
pub fn stage_for_source(source: &Path) -> Option<ShaderStages> {
    match source.extension()?.to_str()? {
        "vert" => Some(ShaderStages::VERTEX),
        "frag" => Some(ShaderStages::FRAGMENT),
        "comp" => Some(ShaderStages::COMPUTE),
        "task" => Some(ShaderStages::TASK),
        "mesh" => Some(ShaderStages::MESH),
        "rgen" => Some(ShaderStages::RAYGEN),
        "rmiss" => Some(ShaderStages::MISS),
        "rchit" => Some(ShaderStages::CLOSEST_HIT),
        "rahit" => Some(ShaderStages::ANY_HIT),
        _ => None,
    }
}

/// `shaders/triangle.vert` -> `shaders/triangle.vert.spv`
pub fn binary_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".spv");
    PathBuf::from(name)
}

/// True when `binary` is missing or its modification time is not strictly
/// after `source`'s
pub fn needs_recompile(source: &Path, binary: &Path) -> Result<bool> {
    let source_time = std::fs::metadata(source)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat shader source: {:?}", source))?;

    let binary_time = match std::fs::metadata(binary).and_then(|m| m.modified()) {
        Ok(time) => time,
        Err(_) => return Ok(true),
    };

    Ok(binary_time <= source_time)
}

// =============================================================================
// COMPILER
// =============================================================================

/// Runs an external GLSL compiler (`glslc` by default)
#[derive(Debug, Clone)]
pub struct ShaderCompiler {
    compiler: String,
    directory: PathBuf,
}

impl ShaderCompiler {
    pub fn new(compiler: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Compile `name` (relative to the shader directory) if its binary is
    /// stale. Returns whether the compiler ran.
    pub fn compile_if_stale(&self, name: &str) -> Result<bool> {
        let source = self.directory.join(name);
        let binary = binary_path(&source);
        if !needs_recompile(&source, &binary)? {
            log::debug!("Shader up to date: {:?}", binary);
            return Ok(false);
        }
        self.compile(&source, &binary)?;
        Ok(true)
    }

    /// Compile every known-stage source in the shader directory
    pub fn compile_all(&self) -> Result<usize> {
        let entries = std::fs::read_dir(&self.directory)
            .with_context(|| format!("Failed to read shader directory: {:?}", self.directory))?;

        let mut compiled = 0;
        for entry in entries {
            let path = entry?.path();
            if stage_for_source(&path).is_none() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.compile_if_stale(name)? {
                compiled += 1;
            }
        }
        Ok(compiled)
    }

    fn compile(&self, source: &Path, binary: &Path) -> Result<()> {
        log::info!("Compiling shader {:?}", source);
        let output = Command::new(&self.compiler)
            .arg(source)
            .arg("-o")
            .arg(binary)
            .output()
            .with_context(|| format!("Failed to run shader compiler '{}'", self.compiler))?;

        if !output.status.success() {
            anyhow::bail!(
                "Failed to compile {:?} (exit code {:?}): {}",
                source,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Compile `name` if needed and load it as a module descriptor
    pub fn load(&self, name: &str, entry_point: &str) -> Result<ShaderModuleDesc> {
        let source = self.directory.join(name);
        let stage = stage_for_source(&source).with_context(|| format!("Unknown shader stage for {:?}", source))?;

        // A shipped binary without its source is used as-is
        if source.exists() {
            self.compile_if_stale(name)?;
        }

        Ok(ShaderModuleDesc {
            code: load_spirv(binary_path(&source))?,
            entry_point: entry_point.to_string(),
            stage,
        })
    }
}

// =============================================================================
// HOT RELOAD
// =============================================================================

/// Watches the shader directory and reports sources that changed
pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<Event>,
}

impl ShaderWatcher {
    pub fn new(directory: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Receiver gone means the watcher is being dropped
                let _ = tx.send(event);
            }
            Err(e) => log::warn!("Shader watcher error: {}", e),
        })
        .context("Failed to create shader watcher")?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch shader directory: {:?}", directory))?;
        log::info!("Watching shaders in {:?}", directory);

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }

    /// Drain pending events into the set of changed shader sources
    pub fn changed_sources(&self) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = Vec::new();
        for event in self.events.try_iter() {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            for path in event.paths {
                if stage_for_source(&path).is_some() && !changed.contains(&path) {
                    changed.push(path);
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("my-rhi-shader-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[test]
    fn missing_binary_is_stale() {
        let dir = test_dir("missing");
        let source = dir.join("a.vert");
        fs::write(&source, "#version 450\nvoid main() {}\n").unwrap();
        assert!(needs_recompile(&source, &binary_path(&source)).unwrap());
    }

    #[test]
    fn binary_must_be_strictly_newer() {
        let dir = test_dir("mtime");
        let source = dir.join("a.frag");
        let binary = binary_path(&source);
        fs::write(&source, "x").unwrap();
        fs::write(&binary, [0u8; 4]).unwrap();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&source, base);

        set_mtime(&binary, base);
        assert!(needs_recompile(&source, &binary).unwrap());

        set_mtime(&binary, base - Duration::from_secs(10));
        assert!(needs_recompile(&source, &binary).unwrap());

        set_mtime(&binary, base + Duration::from_secs(10));
        assert!(!needs_recompile(&source, &binary).unwrap());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = test_dir("nosource");
        let source = dir.join("gone.comp");
        assert!(needs_recompile(&source, &binary_path(&source)).is_err());
    }

    #[test]
    fn up_to_date_binary_skips_the_compiler() {
        let dir = test_dir("fresh");
        let source = dir.join("a.vert");
        fs::write(&source, "x").unwrap();
        fs::write(binary_path(&source), [0u8; 4]).unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&source, base);
        set_mtime(&binary_path(&source), base + Duration::from_secs(1));

        // Would fail to spawn if it ran
        let compiler = ShaderCompiler::new("definitely-not-a-shader-compiler", &dir);
        assert!(!compiler.compile_if_stale("a.vert").unwrap());
        assert!(compiler.compile_if_stale("missing.vert").is_err());
    }

    #[test]
    fn spirv_words_and_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        assert_eq!(parse_spirv(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);

        let swapped: Vec<u8> = bytes.chunks(4).flat_map(|c| c.iter().rev().copied()).collect();
        assert_eq!(parse_spirv(&swapped).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);

        assert!(parse_spirv(&bytes[..6]).is_err());
        assert!(parse_spirv(&[0u8; 8]).is_err());
    }

    #[test]
    fn stage_and_binary_names() {
        assert_eq!(stage_for_source(Path::new("s/t.vert")), Some(ShaderStages::VERTEX));
        assert_eq!(stage_for_source(Path::new("s/t.mesh")), Some(ShaderStages::MESH));
        assert_eq!(stage_for_source(Path::new("s/t.vert.spv")), None);
        assert_eq!(binary_path(Path::new("s/t.frag")), PathBuf::from("s/t.frag.spv"));
    }
}

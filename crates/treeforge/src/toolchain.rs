//! Native C toolchains used to turn generated sources into a shared library.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::utils::{run_with_threads, Parallelism};

/// A C compiler driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toolchain {
    Gcc,
    Clang,
    /// Microsoft Visual C++ (`cl.exe`).
    Msvc,
}

impl Toolchain {
    pub const fn name(self) -> &'static str {
        match self {
            Toolchain::Gcc => "gcc",
            Toolchain::Clang => "clang",
            Toolchain::Msvc => "msvc",
        }
    }

    /// Executable invoked for both compiling and linking.
    pub const fn program(self) -> &'static str {
        match self {
            Toolchain::Gcc => "gcc",
            Toolchain::Clang => "clang",
            Toolchain::Msvc => "cl.exe",
        }
    }

    /// File extension (with the dot) of shared libraries this toolchain builds.
    pub const fn lib_extension(self) -> &'static str {
        match self {
            Toolchain::Msvc => ".dll",
            Toolchain::Gcc | Toolchain::Clang => {
                if cfg!(target_os = "windows") {
                    ".dll"
                } else if cfg!(target_os = "macos") {
                    ".dylib"
                } else {
                    ".so"
                }
            }
        }
    }

    const fn object_extension(self) -> &'static str {
        match self {
            Toolchain::Msvc => "obj",
            Toolchain::Gcc | Toolchain::Clang => "o",
        }
    }

    /// Whether `path` ends with [`lib_extension`](Self::lib_extension).
    pub fn check_extension(self, path: &Path) -> Result<()> {
        let expected = self.lib_extension();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == &expected[1..]);
        if matches {
            Ok(())
        } else {
            Err(Error::ExtensionMismatch {
                toolchain: self.name().to_string(),
                expected,
                path: path.to_path_buf(),
            })
        }
    }

    fn compile_command(self, source: &Path, object: &Path, options: &[String]) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            Toolchain::Msvc => {
                cmd.args(["/nologo", "/c", "/O2"])
                    .arg(format!("/Fo{}", object.display()))
                    .arg(source);
            }
            Toolchain::Gcc | Toolchain::Clang => {
                cmd.args(["-c", "-O3", "-fPIC", "-std=c99", "-o"])
                    .arg(object)
                    .arg(source);
            }
        }
        cmd.args(options);
        cmd
    }

    fn link_command(self, objects: &[PathBuf], library: &Path, options: &[String]) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            Toolchain::Msvc => {
                cmd.args(["/nologo", "/LD"])
                    .arg(format!("/Fe{}", library.display()))
                    .args(objects);
            }
            Toolchain::Gcc | Toolchain::Clang => {
                cmd.args(["-shared", "-O3", "-o"])
                    .arg(library)
                    .args(objects)
                    .arg("-lm");
            }
        }
        cmd.args(options);
        cmd
    }
}

impl FromStr for Toolchain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gcc" => Ok(Toolchain::Gcc),
            "clang" => Ok(Toolchain::Clang),
            "msvc" => Ok(Toolchain::Msvc),
            other => Err(Error::validation(format!(
                "unknown toolchain '{other}': must be one of gcc, clang, msvc"
            ))),
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile every `.c` file in `dir` and link them into a shared library.
///
/// Sources are compiled in parallel (rayon's global pool, or a dedicated pool
/// of `n_threads`). The library is written to `<dir>/<dir name><extension>`
/// and its path returned. `options` are passed to every compiler and linker
/// invocation.
pub fn create_shared(
    toolchain: Toolchain,
    dir: impl AsRef<Path>,
    n_threads: Option<NonZeroUsize>,
    verbose: bool,
    options: &[String],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let sources = list_sources(dir)?;
    if sources.is_empty() {
        return Err(Error::engine(format!(
            "no C source files found in {}",
            dir.display()
        )));
    }

    let parallelism = Parallelism::from_threads(n_threads).correct_for_workload(sources.len());
    let compile = |source: &PathBuf| -> Result<PathBuf> {
        let object = source.with_extension(toolchain.object_extension());
        run(toolchain.compile_command(source, &object, options))?;
        if verbose {
            tracing::info!(source = %source.display(), "compiled");
        }
        Ok(object)
    };
    let objects = run_with_threads(parallelism, |parallel| {
        if parallel {
            sources.par_iter().map(compile).collect::<Result<Vec<_>>>()
        } else {
            sources.iter().map(compile).collect::<Result<Vec<_>>>()
        }
    })??;

    let stem = dir
        .canonicalize()?
        .file_name()
        .and_then(|name| name.to_str())
        .map_or_else(|| "predictor".to_string(), str::to_string);
    let library = dir.join(format!("{stem}{}", toolchain.lib_extension()));
    run(toolchain.link_command(&objects, &library, options))?;

    if verbose {
        tracing::info!(
            %toolchain,
            library = %library.display(),
            n_sources = sources.len(),
            "linked shared library"
        );
    } else {
        tracing::debug!(%toolchain, library = %library.display(), "linked shared library");
    }
    Ok(library)
}

/// `.c` files directly under `dir`, sorted for a deterministic link order.
fn list_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("c") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

fn run(mut cmd: Command) -> Result<()> {
    let pretty = format!("{cmd:?}");
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::engine(format!("failed to run {pretty}: {e}")))?;
    if !output.status.success() {
        return Err(Error::engine(format!(
            "command failed ({}): {pretty}\n{}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        )));
    }
    Ok(())
}

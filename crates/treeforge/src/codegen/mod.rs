//! C prediction code generation.
//!
//! A [`CodeGenerator`] turns a committed [`Model`] into C99 sources: one
//! `header.h` and one or more `.c` files. Generators are looked up by name
//! through [`create_generator`]; `"recursive"` is the built-in one.
//!
//! The generated API mirrors the usual tree-compiler layout:
//!
//! ```c
//! union Entry { int missing; float fvalue; int qvalue; };
//!
//! size_t get_num_output_group(void);
//! size_t get_num_feature(void);
//! const char* get_pred_transform(void);
//! float get_sigmoid_alpha(void);
//! float get_global_bias(void);
//! float predict(union Entry* data, int pred_margin);                           /* 1 group */
//! size_t predict_multiclass(union Entry* data, int pred_margin, float* result); /* >1 group */
//! ```
//!
//! `missing == -1` marks a missing feature value.

mod recursive;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::Model;
use crate::params::Params;

pub use recursive::RecursiveGenerator;

/// Name of the code generator used when none is given.
pub const DEFAULT_COMPILER: &str = "recursive";

/// One generated source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name relative to the output directory.
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub(crate) fn new(name: impl Into<String>, content: String) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Whether this is a translation unit (as opposed to a header).
    pub fn is_source(&self) -> bool {
        self.name.ends_with(".c")
    }
}

/// Turns a committed model into C source files.
pub trait CodeGenerator: Send + Sync {
    /// Registry name of this generator.
    fn name(&self) -> &str;

    /// Apply generator parameters. Unknown keys are errors.
    fn configure(&mut self, params: &Params) -> Result<()>;

    /// Produce the source files for `model`.
    fn generate(&self, model: &Model) -> Result<Vec<SourceFile>>;
}

/// Look up a code generator by name.
pub fn create_generator(name: &str) -> Result<Box<dyn CodeGenerator>> {
    match name {
        "recursive" => Ok(Box::new(RecursiveGenerator::default())),
        other => Err(Error::engine(format!(
            "unrecognized compiler '{other}'; available compilers: recursive"
        ))),
    }
}

/// Files written by [`Model::compile`].
#[derive(Debug, Clone)]
pub struct GeneratedSources {
    dir: PathBuf,
    header: PathBuf,
    sources: Vec<PathBuf>,
}

impl GeneratedSources {
    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `header.h`.
    pub fn header(&self) -> &Path {
        &self.header
    }

    /// Paths of the `.c` files, `main.c` first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

impl Model {
    /// Generate C prediction code into `dir`.
    ///
    /// `dir` is created if needed. `compiler` names a registered code
    /// generator and `params` configures it (`parallel_comp` for the
    /// recursive generator). Progress is logged at `info` level when
    /// `verbose` is set.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use treeforge::{Model, Params};
    ///
    /// let model = Model::load("model.json", "xgboost")?;
    /// let out = model.compile("./my_model", &Params::single("parallel_comp", 4), "recursive", true)?;
    /// assert_eq!(out.sources().len(), 5);
    /// ```
    pub fn compile(
        &self,
        dir: impl AsRef<Path>,
        params: &Params,
        compiler: &str,
        verbose: bool,
    ) -> Result<GeneratedSources> {
        let dir = dir.as_ref();
        let mut generator = create_generator(compiler)?;
        generator.configure(params)?;
        let files = generator.generate(self)?;

        std::fs::create_dir_all(dir)?;
        let mut header = dir.join("header.h");
        let mut sources = Vec::new();
        for file in &files {
            let path = dir.join(&file.name);
            std::fs::write(&path, &file.content)?;
            if verbose {
                tracing::info!(path = %path.display(), bytes = file.content.len(), "wrote source file");
            } else {
                tracing::debug!(path = %path.display(), bytes = file.content.len(), "wrote source file");
            }
            if file.is_source() {
                sources.push(path);
            } else {
                header = path;
            }
        }

        if verbose {
            tracing::info!(
                compiler = generator.name(),
                dir = %dir.display(),
                n_sources = sources.len(),
                n_trees = self.num_trees(),
                "code generation complete"
            );
        }
        Ok(GeneratedSources {
            dir: dir.to_path_buf(),
            header,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_recursive() {
        assert_eq!(create_generator("recursive").unwrap().name(), "recursive");
        let err = create_generator("ast_native").err().unwrap();
        assert!(matches!(err, Error::Engine(_)), "got: {err:?}");
    }

    #[test]
    fn source_files_are_classified_by_extension() {
        assert!(SourceFile::new("main.c", String::new()).is_source());
        assert!(!SourceFile::new("header.h", String::new()).is_source());
    }
}

//! One-step export of a model to a native shared library.

use std::num::NonZeroUsize;
use std::path::Path;

use bon::Builder;

use crate::codegen::DEFAULT_COMPILER;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::params::Params;
use crate::toolchain::{create_shared, Toolchain};

/// Settings for [`Model::export_library`].
///
/// # Example
///
/// ```
/// use treeforge::ExportOptions;
///
/// let options = ExportOptions::builder()
///     .params([("parallel_comp", "8")])
///     .verbose(true)
///     .build()
///     .unwrap();
/// assert_eq!(options.compiler, "recursive");
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ExportOptions {
    /// Code generator parameters, e.g. `parallel_comp`.
    #[builder(default, into)]
    pub params: Params,

    /// Registered code generator name. Default: `"recursive"`.
    #[builder(default = DEFAULT_COMPILER.to_string(), into)]
    pub compiler: String,

    /// Log progress at `info` level. Default: false.
    #[builder(default)]
    pub verbose: bool,

    /// Threads used to compile sources. `None` uses rayon's global pool.
    pub n_threads: Option<NonZeroUsize>,

    /// Extra flags passed to the toolchain.
    #[builder(default)]
    pub options: Vec<String>,
}

impl<S: export_options_builder::IsComplete> ExportOptionsBuilder<S> {
    /// Build and validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the compiler name is empty.
    pub fn build(self) -> Result<ExportOptions> {
        let options = self.__build_internal();
        if options.compiler.trim().is_empty() {
            return Err(Error::validation("compiler name must not be empty"));
        }
        Ok(options)
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions::builder().__build_internal()
    }
}

impl Model {
    /// Generate prediction code and build it into a shared library at
    /// `lib_path`.
    ///
    /// The extension of `lib_path` is checked against `toolchain` before any
    /// work is done. Sources are generated into a temporary directory that is
    /// removed afterwards; `lib_path` is only written once both code
    /// generation and the toolchain succeed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use treeforge::{ExportOptions, Model, Toolchain};
    ///
    /// let model = Model::load("model.txt", "lightgbm")?;
    /// model.export_library(Toolchain::Gcc, "./model.so", &ExportOptions::default())?;
    /// ```
    pub fn export_library(
        &self,
        toolchain: Toolchain,
        lib_path: impl AsRef<Path>,
        options: &ExportOptions,
    ) -> Result<()> {
        let lib_path = lib_path.as_ref();
        toolchain.check_extension(lib_path)?;

        let scratch = tempfile::Builder::new().prefix("treeforge").tempdir()?;
        self.compile(scratch.path(), &options.params, &options.compiler, options.verbose)?;
        let built = create_shared(
            toolchain,
            scratch.path(),
            options.n_threads,
            options.verbose,
            &options.options,
        )?;

        if std::fs::rename(&built, lib_path).is_err() {
            // Crossing filesystems.
            std::fs::copy(&built, lib_path)?;
        }
        tracing::debug!(library = %lib_path.display(), %toolchain, "exported shared library");
        Ok(())
    }
}

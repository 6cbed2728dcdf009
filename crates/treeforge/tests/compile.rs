//! Code generation and shared-library export.

use std::num::NonZeroUsize;

use treeforge::builder::EnsembleConfig;
use treeforge::{tree_builder, EnsembleBuilder, Error, ExportOptions, Model, Params, Toolchain};

fn binary_model(n_trees: usize) -> Model {
    let config = EnsembleConfig::builder()
        .num_feature(3)
        .params([("pred_transform", "sigmoid")])
        .build()
        .unwrap();
    let mut ensemble = EnsembleBuilder::new(config).unwrap();
    for i in 0..n_trees {
        let right = if i % 2 == 1 { -1.0f32 } else { 0.5f32 };
        ensemble.append(tree_builder! {
            0 => num(0, Lt, 0.5, L) -> 1, 2,
            1 => cat(2, [1, 4], R) -> 3, 4,
            2 => leaf(right),
            3 => leaf(-0.5),
            4 => leaf(0.25),
        });
    }
    ensemble.commit().unwrap()
}

#[test]
fn compile_writes_header_and_main() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("nested").join("model");
    let sources = binary_model(2)
        .compile(&out_dir, &Params::new(), "recursive", false)
        .unwrap();

    assert_eq!(sources.dir(), out_dir.as_path());
    assert_eq!(sources.header(), out_dir.join("header.h").as_path());
    assert_eq!(sources.sources(), &[out_dir.join("main.c")]);

    let main = std::fs::read_to_string(out_dir.join("main.c")).unwrap();
    assert!(main.contains("float predict(union Entry* data, int pred_margin)"));
    assert!(main.contains("category_in(data[2].fvalue"));
    assert!(main.contains("sum[0] += -1.000000000e0f;"));
}

#[test]
fn parallel_comp_writes_numbered_units() {
    let dir = tempfile::tempdir().unwrap();
    let sources = binary_model(6)
        .compile(dir.path(), &Params::single("parallel_comp", 4), "recursive", true)
        .unwrap();

    let mut names: Vec<_> = sources
        .sources()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["main.c", "tu0.c", "tu1.c", "tu2.c", "tu3.c"]);
    for name in &names {
        assert!(dir.path().join(name).is_file());
    }
}

#[test]
fn unknown_compiler_and_params_are_engine_errors() {
    let dir = tempfile::tempdir().unwrap();
    let model = binary_model(1);

    let err = model
        .compile(dir.path(), &Params::new(), "ast_native", false)
        .unwrap_err();
    assert!(matches!(err, Error::Engine(_)), "got: {err:?}");

    let err = model
        .compile(dir.path(), &Params::single("annotate_in", "x.json"), "recursive", false)
        .unwrap_err();
    assert!(matches!(err, Error::Engine(_)), "got: {err:?}");
    assert!(err.to_string().contains("annotate_in"));

    // Nothing is written when configuration fails.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn export_rejects_wrong_extension_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let lib_path = dir.path().join("model.wrong");

    let err = binary_model(1)
        .export_library(Toolchain::Gcc, &lib_path, &ExportOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::ExtensionMismatch { .. }), "got: {err:?}");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn export_surfaces_codegen_errors_without_writing_library() {
    let dir = tempfile::tempdir().unwrap();
    let lib_path = dir
        .path()
        .join(format!("model{}", Toolchain::Gcc.lib_extension()));
    let options = ExportOptions::builder()
        .params([("parallel_comp", "many")])
        .build()
        .unwrap();

    let err = binary_model(1)
        .export_library(Toolchain::Gcc, &lib_path, &options)
        .unwrap_err();
    assert!(matches!(err, Error::Engine(_)), "got: {err:?}");
    assert!(!lib_path.exists());
}

#[test]
#[ignore = "requires gcc"]
fn export_library_with_gcc() {
    let dir = tempfile::tempdir().unwrap();
    let lib_path = dir
        .path()
        .join(format!("model{}", Toolchain::Gcc.lib_extension()));
    let options = ExportOptions::builder()
        .params([("parallel_comp", "2")])
        .n_threads(NonZeroUsize::new(2).unwrap())
        .build()
        .unwrap();

    binary_model(4)
        .export_library(Toolchain::Gcc, &lib_path, &options)
        .unwrap();
    assert!(lib_path.is_file());
}

//! Recursive code generator: every tree becomes a nest of `if`/`else` blocks.

use crate::builder::LeafValue;
use crate::error::{Error, Result};
use crate::model::{Model, NodeId, PredTransform, Tree};
use crate::params::Params;

use super::{CodeGenerator, SourceFile};

// =============================================================================
// Generator
// =============================================================================

/// Emits each tree as nested conditionals.
///
/// With `parallel_comp = N > 0` the trees are dealt round-robin into
/// `tu0.c .. tuN-1.c`, so the C compiler can work on them in parallel.
#[derive(Debug, Clone, Default)]
pub struct RecursiveGenerator {
    parallel_comp: usize,
}

impl RecursiveGenerator {
    /// Number of translation units trees are split into (0 = only `main.c`).
    pub fn parallel_comp(&self) -> usize {
        self.parallel_comp
    }
}

impl CodeGenerator for RecursiveGenerator {
    fn name(&self) -> &str {
        "recursive"
    }

    fn configure(&mut self, params: &Params) -> Result<()> {
        for (key, value) in params.iter() {
            match key {
                "parallel_comp" => {
                    self.parallel_comp = value.trim().parse().map_err(|_| {
                        Error::engine(format!(
                            "invalid value '{value}' for compiler parameter 'parallel_comp': expected a non-negative integer"
                        ))
                    })?;
                }
                other => {
                    return Err(Error::engine(format!(
                        "unknown compiler parameter '{other}'"
                    )))
                }
            }
        }
        Ok(())
    }

    fn generate(&self, model: &Model) -> Result<Vec<SourceFile>> {
        check_transform(model)?;

        let mut files = vec![
            SourceFile::new("header.h", header(model, self.parallel_comp)),
            SourceFile::new("main.c", main_source(model, self.parallel_comp)),
        ];
        for unit in 0..self.parallel_comp {
            let trees = (unit..model.num_trees()).step_by(self.parallel_comp);
            let mut code = CodeWriter::new();
            code.line(0, "#include \"header.h\"");
            code.blank();
            code.line(0, &format!("void predict_unit{unit}(union Entry* data, float* sum) {{"));
            write_trees(&mut code, model, trees);
            code.line(0, "}");
            files.push(SourceFile::new(format!("tu{unit}.c"), code.finish()));
        }

        tracing::debug!(
            n_files = files.len(),
            n_trees = model.num_trees(),
            parallel_comp = self.parallel_comp,
            "generated C sources"
        );
        Ok(files)
    }
}

/// Multiclass transforms need several output groups.
fn check_transform(model: &Model) -> Result<()> {
    let transform = model.param().pred_transform;
    if transform.is_multiclass() && model.num_output_group() < 2 {
        return Err(Error::engine(format!(
            "pred_transform '{transform}' requires num_output_group > 1, got {}",
            model.num_output_group()
        )));
    }
    Ok(())
}

// =============================================================================
// Source layout
// =============================================================================

/// Indented line buffer.
struct CodeWriter {
    out: String,
}

impl CodeWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

fn header(model: &Model, parallel_comp: usize) -> String {
    let mut code = CodeWriter::new();
    code.line(0, "#ifndef TREEFORGE_MODEL_H_");
    code.line(0, "#define TREEFORGE_MODEL_H_");
    code.blank();
    for include in ["<stdlib.h>", "<stdint.h>", "<float.h>", "<math.h>"] {
        code.line(0, &format!("#include {include}"));
    }
    code.blank();
    code.line(0, "union Entry {");
    code.line(1, "int missing;");
    code.line(1, "float fvalue;");
    code.line(1, "int qvalue;");
    code.line(0, "};");
    code.blank();
    code.line(0, "static inline int category_in(float fvalue, uint64_t mask) {");
    code.line(1, "if (!(fvalue >= 0.0f && fvalue < 64.0f)) {");
    code.line(2, "return 0;");
    code.line(1, "}");
    code.line(1, "return (int)((mask >> (uint32_t)fvalue) & UINT64_C(1));");
    code.line(0, "}");
    code.blank();
    code.line(0, "size_t get_num_output_group(void);");
    code.line(0, "size_t get_num_feature(void);");
    code.line(0, "const char* get_pred_transform(void);");
    code.line(0, "float get_sigmoid_alpha(void);");
    code.line(0, "float get_global_bias(void);");
    if model.num_output_group() > 1 {
        code.line(0, "size_t predict_multiclass(union Entry* data, int pred_margin, float* result);");
    } else {
        code.line(0, "float predict(union Entry* data, int pred_margin);");
    }
    for unit in 0..parallel_comp {
        code.line(0, &format!("void predict_unit{unit}(union Entry* data, float* sum);"));
    }
    code.blank();
    code.line(0, "#endif  /* TREEFORGE_MODEL_H_ */");
    code.finish()
}

fn main_source(model: &Model, parallel_comp: usize) -> String {
    let param = model.param();
    let n_groups = model.num_output_group();
    let mut code = CodeWriter::new();
    code.line(0, "#include \"header.h\"");
    code.blank();

    code.line(0, "size_t get_num_output_group(void) {");
    code.line(1, &format!("return {n_groups};"));
    code.line(0, "}");
    code.blank();
    code.line(0, "size_t get_num_feature(void) {");
    code.line(1, &format!("return {};", model.num_feature()));
    code.line(0, "}");
    code.blank();
    code.line(0, "const char* get_pred_transform(void) {");
    code.line(1, &format!("return \"{}\";", param.pred_transform));
    code.line(0, "}");
    code.blank();
    code.line(0, "float get_sigmoid_alpha(void) {");
    code.line(1, &format!("return {};", float_literal(param.sigmoid_alpha)));
    code.line(0, "}");
    code.blank();
    code.line(0, "float get_global_bias(void) {");
    code.line(1, &format!("return {};", float_literal(param.global_bias)));
    code.line(0, "}");
    code.blank();

    if n_groups > 1 {
        code.line(
            0,
            "size_t predict_multiclass(union Entry* data, int pred_margin, float* result) {",
        );
    } else {
        code.line(0, "float predict(union Entry* data, int pred_margin) {");
    }
    code.line(1, &format!("float sum[{n_groups}] = {{0.0f}};"));
    if parallel_comp > 0 {
        for unit in 0..parallel_comp {
            code.line(1, &format!("predict_unit{unit}(data, sum);"));
        }
    } else {
        write_trees(&mut code, model, 0..model.num_trees());
    }

    code.line(1, &format!("for (size_t i = 0; i < {n_groups}; ++i) {{"));
    if model.random_forest() && model.num_trees() > 0 {
        code.line(2, &format!("sum[i] /= {}.0f;", model.num_trees()));
    }
    code.line(2, &format!("sum[i] += {};", float_literal(param.global_bias)));
    code.line(1, "}");

    if n_groups > 1 {
        code.line(1, &format!("for (size_t i = 0; i < {n_groups}; ++i) {{"));
        code.line(2, "result[i] = sum[i];");
        code.line(1, "}");
        code.line(1, "if (pred_margin) {");
        code.line(2, &format!("return {n_groups};"));
        code.line(1, "}");
        write_multiclass_transform(&mut code, model);
    } else {
        match elementwise_transform(param.pred_transform, param.sigmoid_alpha, "sum[0]") {
            Some(expr) => {
                code.line(1, "if (!pred_margin) {");
                code.line(2, &format!("sum[0] = {expr};"));
                code.line(1, "}");
            }
            None => code.line(1, "(void)pred_margin;"),
        }
        code.line(1, "return sum[0];");
    }
    code.line(0, "}");
    code.finish()
}

/// C expression applying a per-group transform to `x`.
fn elementwise_transform(transform: PredTransform, alpha: f32, x: &str) -> Option<String> {
    match transform {
        PredTransform::Sigmoid | PredTransform::MulticlassOva => Some(format!(
            "1.0f / (1.0f + expf(-{} * {x}))",
            float_literal(alpha)
        )),
        PredTransform::Exponential => Some(format!("expf({x})")),
        PredTransform::LogarithmOnePlusExp => Some(format!("log1pf(expf({x}))")),
        PredTransform::Identity | PredTransform::Softmax | PredTransform::MaxIndex => None,
    }
}

fn write_multiclass_transform(code: &mut CodeWriter, model: &Model) {
    let param = model.param();
    let n_groups = model.num_output_group();
    match param.pred_transform {
        PredTransform::Softmax => {
            code.line(1, "float max_margin = result[0];");
            code.line(1, &format!("for (size_t i = 1; i < {n_groups}; ++i) {{"));
            code.line(2, "if (result[i] > max_margin) {");
            code.line(3, "max_margin = result[i];");
            code.line(2, "}");
            code.line(1, "}");
            code.line(1, "double norm = 0.0;");
            code.line(1, &format!("for (size_t i = 0; i < {n_groups}; ++i) {{"));
            code.line(2, "result[i] = expf(result[i] - max_margin);");
            code.line(2, "norm += result[i];");
            code.line(1, "}");
            code.line(1, &format!("for (size_t i = 0; i < {n_groups}; ++i) {{"));
            code.line(2, "result[i] = (float)(result[i] / norm);");
            code.line(1, "}");
            code.line(1, &format!("return {n_groups};"));
        }
        PredTransform::MaxIndex => {
            code.line(1, "size_t max_index = 0;");
            code.line(1, &format!("for (size_t i = 1; i < {n_groups}; ++i) {{"));
            code.line(2, "if (result[i] > result[max_index]) {");
            code.line(3, "max_index = i;");
            code.line(2, "}");
            code.line(1, "}");
            code.line(1, "result[0] = (float)max_index;");
            code.line(1, "return 1;");
        }
        transform => {
            if let Some(expr) = elementwise_transform(transform, param.sigmoid_alpha, "result[i]") {
                code.line(1, &format!("for (size_t i = 0; i < {n_groups}; ++i) {{"));
                code.line(2, &format!("result[i] = {expr};"));
                code.line(1, "}");
            }
            code.line(1, &format!("return {n_groups};"));
        }
    }
}

// =============================================================================
// Trees
// =============================================================================

fn write_trees(code: &mut CodeWriter, model: &Model, trees: impl Iterator<Item = usize>) {
    let mut empty = true;
    for idx in trees {
        empty = false;
        code.line(1, &format!("/* tree {idx} */"));
        write_node(code, model.tree(idx), 0, model.tree_group(idx), 1);
    }
    if empty {
        code.line(1, "(void)data;");
        code.line(1, "(void)sum;");
    }
}

fn write_node(code: &mut CodeWriter, tree: &Tree, node: NodeId, group: u32, indent: usize) {
    if tree.is_leaf(node) {
        match tree.leaf_value(node) {
            LeafValue::Scalar(v) => {
                code.line(indent, &format!("sum[{group}] += {};", float_literal(*v)));
            }
            LeafValue::Vector(values) => {
                for (g, v) in values.iter().enumerate() {
                    code.line(indent, &format!("sum[{g}] += {};", float_literal(*v)));
                }
            }
        }
        return;
    }

    code.line(indent, &format!("if ({}) {{", condition(tree, node)));
    write_node(code, tree, tree.left_child(node), group, indent + 1);
    code.line(indent, "} else {");
    write_node(code, tree, tree.right_child(node), group, indent + 1);
    code.line(indent, "}");
}

/// Condition under which `node` sends a row to its left child.
fn condition(tree: &Tree, node: NodeId) -> String {
    let feature = tree.split_index(node);
    let test = if tree.is_categorical(node) {
        format!(
            "category_in(data[{feature}].fvalue, UINT64_C(0x{:016x}))",
            tree.category_mask(node).bits()
        )
    } else {
        format!(
            "data[{feature}].fvalue {} {}",
            tree.operator(node).symbol(),
            float_literal(tree.threshold(node))
        )
    };
    if tree.default_left(node) {
        format!("data[{feature}].missing == -1 || {test}")
    } else {
        format!("data[{feature}].missing != -1 && {test}")
    }
}

/// C float literal that round-trips `v`.
fn float_literal(v: f32) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
    } else {
        format!("{v:.9e}f")
    }
}

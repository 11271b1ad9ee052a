//! JSON minification.

use crate::build::{
    discover_files, output_path, read_source, write_output, Task, TaskContext, TaskError,
    TaskOutput,
};
use serde_json::Value;

/// Re-serialize every JSON file under the data directory compactly.
#[derive(Debug, Default)]
pub struct JsonTask;

impl Task for JsonTask {
    fn name(&self) -> &str {
        "json"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let data = &ctx.config().data;
        let dir = ctx.src_path(&data.dir);
        let files = discover_files(&dir, "**/*.json")?;
        if files.is_empty() {
            return Ok(TaskOutput::skipped(format!("no JSON files in {}", dir.display())));
        }

        let out_dir = ctx.out_path(&data.out);
        let mut outputs = Vec::with_capacity(files.len());
        for file in &files {
            let minified = minify_json(&read_source(file)?)
                .map_err(|e| TaskError::transform(file, e.to_string()))?;
            let out = output_path(&dir, file, &out_dir, None);
            write_output(&out, minified)?;
            outputs.push(out);
        }
        Ok(TaskOutput::files(outputs))
    }
}

/// Parse and print without whitespace, keeping key order.
pub fn minify_json(source: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(source)?;
    serde_json::to_string(&value)
}

use item_writer::{FileFormat, WriterMetrics};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_name: String,
    pub format: FileFormat,
    pub inputs: Vec<InputManifest>,
    pub total_input_rows: usize,
    /// `None` when nothing was written and no empty file was requested.
    pub output: Option<WriterMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputManifest {
    pub path: String,
    pub rows: usize,
}

impl Manifest {
    pub fn new(run_name: String, format: FileFormat) -> Self {
        Self {
            run_name,
            format,
            inputs: Vec::new(),
            total_input_rows: 0,
            output: None,
        }
    }

    pub fn add_input(&mut self, path: &Path, rows: usize) {
        self.total_input_rows += rows;
        self.inputs.push(InputManifest {
            path: path.to_string_lossy().to_string(),
            rows,
        });
    }

    /// `<output>.manifest.json`, next to the output file.
    pub fn path_for(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".manifest.json");
        PathBuf::from(name)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

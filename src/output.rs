//! Node and edge CSV output
//!
//! Writes the two tables consumed by network visualization tools:
//!
//! - `edges.csv`: `Target,Source`
//! - `nodes.csv`: `ID,Label,Color,SizeN,Type` (weighted) or
//!   `ID,Label,Color,SizeN` (simplified, integer colors)
//!
//! Both files are written to temporary files in the output directory and
//! renamed into place only after both are complete, so a failed run leaves
//! the previous outputs untouched.

use crate::config::OutputConfig;
use crate::error::{NetplotError, Result};
use crate::models::{Edge, Graph, Node, OutputPaths, Variant};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

pub const EDGE_HEADER: [&str; 2] = ["Target", "Source"];
pub const WEIGHTED_NODE_HEADER: [&str; 5] = ["ID", "Label", "Color", "SizeN", "Type"];
pub const SIMPLIFIED_NODE_HEADER: [&str; 4] = ["ID", "Label", "Color", "SizeN"];

pub struct CsvSink {
    directory: PathBuf,
    nodes_file: String,
    edges_file: String,
    variant: Variant,
}

impl CsvSink {
    pub fn new(config: &OutputConfig, variant: Variant) -> Self {
        Self {
            directory: config.directory.clone(),
            nodes_file: config.nodes_file.clone(),
            edges_file: config.edges_file.clone(),
            variant,
        }
    }

    pub fn paths(&self) -> OutputPaths {
        OutputPaths {
            nodes: self.directory.join(&self.nodes_file),
            edges: self.directory.join(&self.edges_file),
        }
    }

    /// Write both tables; on any error neither target file is touched.
    pub fn write(&self, graph: &Graph) -> Result<OutputPaths> {
        let paths = self.paths();
        fs::create_dir_all(&self.directory).map_err(|source| NetplotError::Output {
            path: self.directory.clone(),
            source,
        })?;

        let nodes_tmp = self.write_temp(&paths.nodes, |w| self.write_nodes(w, &graph.nodes))?;
        let edges_tmp = self.write_temp(&paths.edges, |w| write_edges(w, &graph.edges))?;

        persist(nodes_tmp, &paths.nodes)?;
        persist(edges_tmp, &paths.edges)?;

        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            nodes_file = %paths.nodes.display(),
            edges_file = %paths.edges.display(),
            "Wrote graph CSV files"
        );
        Ok(paths)
    }

    fn write_temp<F>(&self, target: &Path, fill: F) -> Result<NamedTempFile>
    where
        F: FnOnce(&mut csv::Writer<&mut NamedTempFile>) -> Result<()>,
    {
        let output_err = |source: std::io::Error| NetplotError::Output {
            path: target.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.directory).map_err(output_err)?;
        {
            let mut writer = csv::Writer::from_writer(&mut tmp);
            fill(&mut writer)?;
            writer.flush().map_err(output_err)?;
        }
        tmp.flush().map_err(output_err)?;
        tmp.as_file().sync_all().map_err(output_err)?;
        Ok(tmp)
    }

    fn write_nodes<W: Write>(&self, writer: &mut csv::Writer<W>, nodes: &[Node]) -> Result<()> {
        match self.variant {
            Variant::Weighted => writer.write_record(WEIGHTED_NODE_HEADER)?,
            Variant::Simplified => writer.write_record(SIMPLIFIED_NODE_HEADER)?,
        }

        for node in nodes {
            let size = node.size.to_string();
            match self.variant {
                Variant::Weighted => {
                    let color = format_color(node.color);
                    let kind = node.kind.type_code().to_string();
                    writer.write_record([
                        node.id.as_str(),
                        node.label.as_str(),
                        color.as_str(),
                        size.as_str(),
                        kind.as_str(),
                    ])?;
                }
                Variant::Simplified => {
                    let color = format!("{}", node.color.round() as u8);
                    writer.write_record([
                        node.id.as_str(),
                        node.label.as_str(),
                        color.as_str(),
                        size.as_str(),
                    ])?;
                }
            }
        }
        Ok(())
    }
}

fn write_edges<W: Write>(writer: &mut csv::Writer<W>, edges: &[Edge]) -> Result<()> {
    writer.write_record(EDGE_HEADER)?;
    for edge in edges {
        writer.write_record([edge.target.as_str(), edge.source.as_str()])?;
    }
    Ok(())
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<()> {
    tmp.persist(target).map_err(|e| NetplotError::Output {
        path: target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Shortest round-trip form that always carries a decimal point (`1.0`, `0.25`).
pub fn format_color(color: f64) -> String {
    format!("{:?}", color)
}

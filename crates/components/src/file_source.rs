//! FileSourceComponent - reads a delimited text file
//!
//! The first line is the header. Every following non-empty line becomes one
//! row holding `_line` (1-based line number in the file) plus one column
//! per header field.

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ParameterDef, ParameterSet, Ports, Result, Row,
    WorkerContext,
};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Reads rows from a delimited file
pub struct FileSourceComponent {
    params: ParameterSet,
}

impl Default for FileSourceComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![
                ParameterDef::string("filepath")
                    .label("File Path")
                    .description("Path of the file to read")
                    .required(),
                ParameterDef::string("delimiter")
                    .label("Delimiter")
                    .default_value(","),
                ParameterDef::string("encoding")
                    .label("Encoding")
                    .default_value("UTF-8"),
            ]),
        }
    }
}

impl ComponentDefinition for FileSourceComponent {
    const ID: &'static str = "file-source";
    const LABEL: &'static str = "File Source";
    const DESCRIPTION: &'static str = "Reads data from a delimited file";
    const KIND: ComponentKind = ComponentKind::Source;
    const TYPE_PATH: &'static str = "etlflow_components::FileSourceComponent";
    const SUPPORTS_CONTROL_FLOW: bool = true;
}

/// Split a line on a delimiter; an empty delimiter keeps the whole line
pub(crate) fn split_line<'a>(line: &'a str, delimiter: &str) -> Vec<&'a str> {
    if delimiter.is_empty() {
        vec![line]
    } else {
        line.split(delimiter).collect()
    }
}

#[async_trait]
impl Component for FileSourceComponent {
    fn component_id(&self) -> &str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        Self::KIND
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    async fn run(&mut self, ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        let path = self.params.require_str("filepath")?;
        let delimiter = self.params.get_str("delimiter").unwrap_or_else(|| ",".into());
        let encoding = self.params.get_str("encoding").unwrap_or_else(|| "UTF-8".into());
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(Error::parameter(
                "encoding",
                format!("unsupported encoding '{encoding}', only UTF-8 is available"),
            ));
        }

        ctx.info(format!("Reading file: {path}"));
        let file = File::open(&path)
            .await
            .map_err(|e| Error::component(format!("cannot open '{path}': {e}")))?;
        let mut lines = BufReader::new(file).lines();

        let mut header: Option<Vec<String>> = None;
        let mut line_no = 0u64;
        let mut rows = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some(columns) = &header else {
                header = Some(
                    split_line(line, &delimiter)
                        .into_iter()
                        .map(|c| c.trim().to_string())
                        .collect(),
                );
                continue;
            };

            let mut row = Row::new();
            row.set("_line", line_no);
            for (column, value) in columns.iter().zip(split_line(line, &delimiter)) {
                row.set(column.clone(), value);
            }
            ports.send(row).await?;
            rows += 1;
        }

        ctx.info(format!("Read {rows} rows, sending terminator"));
        ports.output.finish().await
    }
}

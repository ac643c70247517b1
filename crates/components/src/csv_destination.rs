//! CsvDestinationComponent - writes rows to a delimited file
//!
//! The header is fixed by the first row. Fields a later row adds are not
//! written; the first such row logs a warning.

use crate::registry::ComponentDefinition;
use etlflow_runtime::row::value_to_text;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, DependencySpec, Error, ParameterDef, ParameterSet,
    Ports, Result, Row, WorkerContext,
};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Quote a field when it contains the delimiter, a quote or a line break
pub(crate) fn csv_field(text: &str, delimiter: &str) -> String {
    let needs_quotes = (!delimiter.is_empty() && text.contains(delimiter))
        || text.contains('"')
        || text.contains('\n')
        || text.contains('\r');
    if needs_quotes {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>, delimiter: &str) -> String {
    let mut line = fields
        .map(|f| csv_field(f, delimiter))
        .collect::<Vec<_>>()
        .join(delimiter);
    line.push('\n');
    line
}

/// Writes rows to a CSV file; the header comes from the first row
pub struct CsvDestinationComponent {
    params: ParameterSet,
}

impl Default for CsvDestinationComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![
                ParameterDef::string("filepath")
                    .label("File Path")
                    .description("Path of the CSV file to write")
                    .required(),
                ParameterDef::string("delimiter")
                    .label("Delimiter")
                    .default_value(","),
            ]),
        }
    }
}

impl ComponentDefinition for CsvDestinationComponent {
    const ID: &'static str = "csv-destination";
    const LABEL: &'static str = "CSV Destination";
    const DESCRIPTION: &'static str = "Writes data to a CSV file";
    const KIND: ComponentKind = ComponentKind::Destination;
    const TYPE_PATH: &'static str = "etlflow_components::CsvDestinationComponent";
    const DEPENDENCIES: &'static [DependencySpec] =
        &[DependencySpec::new("org.apache.commons", "commons-csv", "1.10.0").optional()];
}

impl CsvDestinationComponent {
    async fn write_row(
        writer: &mut BufWriter<File>,
        header: &[String],
        row: &Row,
        delimiter: &str,
    ) -> Result<()> {
        let values: Vec<String> = header
            .iter()
            .map(|column| row.get(column).map(value_to_text).unwrap_or_default())
            .collect();
        let line = csv_line(values.iter().map(String::as_str), delimiter);
        writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl Component for CsvDestinationComponent {
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

        let file = File::create(&path)
            .await
            .map_err(|e| Error::component(format!("cannot create '{path}': {e}")))?;
        let mut writer = BufWriter::new(file);
        let mut header: Option<Vec<String>> = None;
        let mut written = 0u64;
        let mut warned_extra = false;

        loop {
            let row = ports.take().await?;
            if row.is_terminator() {
                break;
            }
            if header.is_none() {
                let columns: Vec<String> = row.payload().keys().cloned().collect();
                let line = csv_line(columns.iter().map(String::as_str), &delimiter);
                writer.write_all(line.as_bytes()).await?;
                header = Some(columns);
            }
            if let Some(columns) = &header {
                if !warned_extra {
                    let extra: Vec<&str> = row
                        .payload()
                        .keys()
                        .filter(|key| !columns.contains(*key))
                        .map(String::as_str)
                        .collect();
                    if !extra.is_empty() {
                        ctx.warn(format!(
                            "Row {} has fields not in the header, dropping: {}",
                            written + 1,
                            extra.join(", ")
                        ));
                        warned_extra = true;
                    }
                }
                Self::write_row(&mut writer, columns, &row, &delimiter).await?;
            }
            written += 1;
        }

        writer.flush().await?;
        ctx.info(format!("Wrote {written} rows to {path}"));
        Ok(())
    }
}

//! Tabular logging of node values over time.

use ferro_ir::{Design, Node};
use std::io;

struct Column {
    name: String,
    node: Node,
    values: Vec<String>,
}

/// Collects named node values cycle by cycle and renders them as a text
/// table to an arbitrary sink.
///
/// Call [`capture`](Logger::capture) once per simulated step, after
/// `run(1)`.
#[derive(Default)]
pub struct Logger {
    columns: Vec<Column>,
}

impl Logger {
    /// Creates an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node under the given column name.
    pub fn add(&mut self, name: &str, node: Node) {
        self.columns.push(Column {
            name: name.to_string(),
            node,
            values: Vec::new(),
        });
    }

    /// Records the current value of every registered node.
    pub fn capture(&mut self, design: &Design) {
        for column in &mut self.columns {
            column.values.push(design.read(column.node).to_string());
        }
    }

    /// The number of captured cycles.
    pub fn cycles(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Renders the table: one row per registered node with its name, bit
    /// width, type, and the sequence of formatted values.
    pub fn write_table(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        let name_width = self
            .columns
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(4)
            .max(4);
        let type_width = self
            .columns
            .iter()
            .map(|c| c.node.ty().to_string().len())
            .max()
            .unwrap_or(4)
            .max(4);

        writeln!(
            sink,
            " {:<name_width$} | {:>5} | {:<type_width$} | values",
            "name", "width", "type"
        )?;
        writeln!(
            sink,
            "-{:-<name_width$}-+-------+-{:-<type_width$}-+-------",
            "", ""
        )?;
        for column in &self.columns {
            let bits = column.node.ty().bit_width().unwrap_or(0);
            writeln!(
                sink,
                " {:<name_width$} | {:>5} | {:<type_width$} | {}",
                column.name,
                bits,
                column.node.ty().to_string(),
                column.values.join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_fixed::SignalType;
    use ferro_ir::Value;
    use ferro_sim::Simulator;

    #[test]
    fn captures_per_cycle() {
        let mut design = Design::new();
        let enable = design.constant(Value::Bool(true));
        let source = design.source(SignalType::ufix(4, 0), 1, enable).unwrap();
        design
            .set_source_data(
                source.block,
                (1..=3)
                    .map(|i| {
                        Value::Fixed(
                            ferro_fixed::DynFix::from_i64_with(false, 4, 0, i).unwrap(),
                        )
                    })
                    .collect(),
                false,
            )
            .unwrap();

        let mut logger = Logger::new();
        logger.add("data", source.data[0]);

        let mut sim = Simulator::new(&mut design).unwrap();
        for _ in 0..3 {
            sim.run(&mut design, 1).unwrap();
            logger.capture(&design);
        }

        assert_eq!(logger.cycles(), 3);
        let mut out = Vec::new();
        logger.write_table(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("data"));
        assert!(text.contains("ufix<4,0>"));
        assert!(text.contains("1 2 3"));
    }

    #[test]
    fn empty_logger_renders_header() {
        let logger = Logger::new();
        let mut out = Vec::new();
        logger.write_table(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("name"));
    }
}
